//! MQTT v3.1.1 codec tests
//!
//! Byte layouts follow sections 2 and 3 of the MQTT v3.1.1 standard.

use bytes::{Bytes, BytesMut};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use test_case::test_case;

use super::*;
use crate::protocol::{connect_flags, DecodeError, EncodeError, PacketType, QoS};

fn encode(mut packet: Packet) -> Bytes {
    packet.to_bytes().unwrap()
}

// ============================================================================
// Remaining length (variable byte integer)
// ============================================================================

#[test_case(0, &[0x00]; "zero")]
#[test_case(127, &[0x7F]; "one byte max")]
#[test_case(128, &[0x80, 0x01]; "two byte min")]
#[test_case(321, &[0xC1, 0x02]; "three hundred twenty one")]
#[test_case(16_383, &[0xFF, 0x7F]; "two byte max")]
#[test_case(16_384, &[0x80, 0x80, 0x01]; "three byte min")]
#[test_case(2_097_151, &[0xFF, 0xFF, 0x7F]; "three byte max")]
#[test_case(2_097_152, &[0x80, 0x80, 0x80, 0x01]; "four byte min")]
#[test_case(268_435_455, &[0xFF, 0xFF, 0xFF, 0x7F]; "four byte max")]
fn test_variable_int_vectors(value: usize, bytes: &[u8]) {
    assert_eq!(encode_variable_int(value).unwrap(), bytes);
    assert_eq!(read_variable_int(bytes).unwrap(), (bytes.len(), value));
    assert_eq!(variable_int_len(value), bytes.len());
}

#[test]
fn test_variable_int_too_large() {
    assert_eq!(
        encode_variable_int(MAX_REMAINING_LENGTH + 1),
        Err(EncodeError::PacketTooLarge)
    );
}

#[test]
fn test_variable_int_malformed_after_four_bytes() {
    let result = read_variable_int(&[0xFF, 0xFF, 0xFF, 0xFF, 0x01]);
    assert_eq!(result, Err(DecodeError::MalformedLength));
}

#[test]
fn test_variable_int_incomplete() {
    assert_eq!(read_variable_int(&[]), Err(DecodeError::InsufficientData));
    assert_eq!(
        read_variable_int(&[0xC1]),
        Err(DecodeError::InsufficientData)
    );
}

#[test]
fn test_variable_int_ignores_trailing_bytes() {
    assert_eq!(read_variable_int(&[0xC1, 0x02, 0xAA]).unwrap(), (2, 321));
}

proptest! {
    #[test]
    fn prop_variable_int_round_trip(value in 0usize..(1 << 28)) {
        let bytes = encode_variable_int(value).unwrap();
        prop_assert_eq!(read_variable_int(&bytes).unwrap(), (bytes.len(), value));
    }

    #[test]
    fn prop_string_round_trip(s in "\\PC{0,200}") {
        let bytes = encode_string(&s).unwrap();
        let (consumed, decoded) = read_string(&bytes).unwrap();
        prop_assert_eq!(consumed, 2 + s.len());
        prop_assert_eq!(decoded, s.as_str());
    }
}

// ============================================================================
// Primitive encoders
// ============================================================================

#[test]
fn test_u16_is_big_endian_both_ways() {
    assert_eq!(u16_to_bytes(0x1234), [0x12, 0x34]);
    assert_eq!(read_u16(&[0x12, 0x34]).unwrap(), 0x1234);
    // Little-endian decoding would yield 0x0100
    assert_eq!(read_u16(&[0x00, 0x01]).unwrap(), 1);
    assert_eq!(read_u16(&u16_to_bytes(60)).unwrap(), 60);
}

#[test]
fn test_read_u16_short() {
    assert_eq!(read_u16(&[0x01]), Err(DecodeError::InsufficientData));
}

#[test]
fn test_string_encode() {
    let bytes = encode_string("hello world$").unwrap();
    assert_eq!(&bytes[..2], &[0x00, 0x0C]);
    assert_eq!(&bytes[2..], b"hello world$");
    assert_eq!(string_len("hello world$"), 14);
}

#[test]
fn test_string_multibyte_length_counts_bytes() {
    let bytes = encode_string("é").unwrap();
    assert_eq!(bytes, vec![0x00, 0x02, 0xC3, 0xA9]);
}

#[test]
fn test_string_too_long() {
    let long = "x".repeat(65_536);
    assert_eq!(encode_string(&long), Err(EncodeError::StringTooLong));
}

#[test]
fn test_read_string_errors() {
    assert_eq!(
        read_string(&[0x00, 0x05, b'a']),
        Err(DecodeError::InsufficientData)
    );
    assert_eq!(
        read_string(&[0x00, 0x01, 0xFF]),
        Err(DecodeError::InvalidUtf8)
    );
}

// ============================================================================
// Fixed header
// ============================================================================

#[test_case(FixedHeader::connect(), 0x10; "connect")]
#[test_case(FixedHeader::connack(), 0x20; "connack")]
#[test_case(FixedHeader::publish(QoS::AtMostOnce, false, false), 0x30; "publish")]
#[test_case(FixedHeader::puback(), 0x40; "puback")]
#[test_case(FixedHeader::pubrec(), 0x50; "pubrec")]
#[test_case(FixedHeader::pubrel(), 0x62; "pubrel")]
#[test_case(FixedHeader::pubcomp(), 0x70; "pubcomp")]
#[test_case(FixedHeader::subscribe(), 0x82; "subscribe")]
#[test_case(FixedHeader::suback(), 0x90; "suback")]
#[test_case(FixedHeader::unsubscribe(), 0xA2; "unsubscribe")]
#[test_case(FixedHeader::unsuback(), 0xB0; "unsuback")]
#[test_case(FixedHeader::pingreq(), 0xC0; "pingreq")]
#[test_case(FixedHeader::pingresp(), 0xD0; "pingresp")]
#[test_case(FixedHeader::disconnect(), 0xE0; "disconnect")]
fn test_fixed_header_control_bytes(header: FixedHeader, control: u8) {
    assert_eq!(header.control(), control);
}

#[test_case(PacketType::PubAck, true; "puback")]
#[test_case(PacketType::SubAck, true; "suback")]
#[test_case(PacketType::Unsubscribe, true; "unsubscribe")]
#[test_case(PacketType::Publish, false; "publish id depends on qos")]
#[test_case(PacketType::ConnAck, false; "connack")]
#[test_case(PacketType::PingResp, false; "pingresp")]
fn test_packet_type_has_packet_id(packet_type: PacketType, expected: bool) {
    assert_eq!(packet_type.has_packet_id(), expected);
}

#[test]
fn test_qos_try_from() {
    assert_eq!(QoS::try_from(2), Ok(QoS::ExactlyOnce));
    assert_eq!(QoS::try_from(3), Err(EncodeError::InvalidQoS(3)));
}

#[test_case(QoS::AtMostOnce, false, false, 0x30)]
#[test_case(QoS::AtLeastOnce, false, false, 0x32)]
#[test_case(QoS::ExactlyOnce, false, false, 0x34)]
#[test_case(QoS::AtLeastOnce, true, false, 0x3A)]
#[test_case(QoS::AtMostOnce, false, true, 0x31)]
#[test_case(QoS::ExactlyOnce, true, true, 0x3D)]
fn test_publish_header_flags(qos: QoS, dup: bool, retain: bool, control: u8) {
    let header = FixedHeader::publish(qos, dup, retain);
    assert_eq!(header.control(), control);
    assert_eq!(header.qos(), Some(qos));
    assert_eq!(header.dup(), dup);
    assert_eq!(header.retain(), retain);
}

#[test]
fn test_fixed_header_encode_decode() {
    let mut header = FixedHeader::suback();
    header.set_remaining_length(321);

    let mut buf = BytesMut::new();
    header.encode(&mut buf).unwrap();
    assert_eq!(buf.as_ref(), &[0x90, 0xC1, 0x02]);
    assert_eq!(header.encoded_len(), 3);

    let (consumed, decoded) = FixedHeader::decode(&buf).unwrap();
    assert_eq!(consumed, 3);
    assert_eq!(decoded, header);
    assert_eq!(decoded.packet_type(), Some(PacketType::SubAck));
}

#[test]
fn test_fixed_header_decode_empty() {
    assert_eq!(FixedHeader::decode(&[]), Err(DecodeError::InsufficientData));
}

// ============================================================================
// Variable header and payload
// ============================================================================

#[test]
fn test_connect_variable_header() {
    let vh = VariableHeader::connect("MQTT", 4, connect_flags::CLEAN_SESSION, 60);
    let bytes = vh.to_bytes().unwrap();
    assert_eq!(
        bytes.as_ref(),
        &[0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x02, 0x00, 0x3C]
    );
    assert_eq!(vh.len(), 10);
}

#[test]
fn test_publish_variable_header_packet_id() {
    let qos0 = VariableHeader::publish("a/b", None);
    assert_eq!(qos0.to_bytes().unwrap().as_ref(), &[0x00, 0x03, b'a', b'/', b'b']);
    assert_eq!(qos0.packet_id(), None);

    let qos1 = VariableHeader::publish("a/b", Some(0x0102));
    assert_eq!(
        qos1.to_bytes().unwrap().as_ref(),
        &[0x00, 0x03, b'a', b'/', b'b', 0x01, 0x02]
    );
    assert_eq!(qos1.len(), 7);
    assert_eq!(qos1.packet_id(), Some(0x0102));
}

#[test]
fn test_variable_header_len_follows_content() {
    let mut vh = VariableHeader::publish("a", None);
    assert_eq!(vh.len(), 3);
    if let VariableHeader::Publish { topic_name, .. } = &mut vh {
        topic_name.push_str("/longer");
    }
    assert_eq!(vh.len(), 10);
    assert_eq!(vh.len(), vh.to_bytes().unwrap().len());
}

#[test]
fn test_payload_strings_and_qos() {
    let payload = Payload::new().with_string("a/#").with_qos(1);
    assert_eq!(
        payload.to_bytes().unwrap().as_ref(),
        &[0x00, 0x03, b'a', b'/', b'#', 0x01]
    );
    assert_eq!(payload.len(), 6);
    assert_eq!(payload.qos(), Some(1));
}

#[test]
fn test_payload_message_is_raw() {
    let payload = Payload::message("hi");
    assert_eq!(payload.to_bytes().unwrap().as_ref(), b"hi");
    assert_eq!(payload.len(), 2);
    assert!(Payload::new().is_empty());
}

// ============================================================================
// Packets
// ============================================================================

#[test]
fn test_connect_scenario() {
    let packet = Packet::new(FixedHeader::connect())
        .with_variable_header(VariableHeader::connect(
            "MQTT",
            4,
            connect_flags::CLEAN_SESSION,
            60,
        ))
        .with_payload(Payload::new().with_string("abc"));

    let bytes = encode(packet);
    assert_eq!(bytes[0], 0x10);
    assert_eq!(bytes[1], 15);
    assert_eq!(bytes.len(), 17);
    let mut variable_header = encode_string("MQTT").unwrap();
    variable_header.extend_from_slice(&[0x04, 0x02]);
    variable_header.extend_from_slice(&u16_to_bytes(60));
    assert_eq!(&bytes[2..12], &variable_header[..]);
    assert_eq!(&bytes[12..], &[0x00, 0x03, b'a', b'b', b'c']);
}

#[test]
fn test_remaining_length_recomputed_on_encode() {
    let mut packet = Packet::publish("t", None, "x", QoS::AtMostOnce, false, false);
    packet.header.set_remaining_length(99);
    let bytes = packet.to_bytes().unwrap();
    assert_eq!(bytes[1], 4);
    assert_eq!(packet.header.remaining_length(), 4);
}

#[test]
fn test_publish_with_large_payload_uses_multibyte_length() {
    let message = vec![b'x'; 300];
    let bytes = encode(Packet::publish(
        "t",
        None,
        message,
        QoS::AtMostOnce,
        false,
        false,
    ));
    // 3 bytes of topic + 300 bytes of message
    assert_eq!(&bytes[..3], &[0x30, 0xAF, 0x02]);
    assert_eq!(bytes.len(), 3 + 303);
}

#[test_case(Packet::puback(7), &[0x40, 0x02, 0x00, 0x07]; "puback")]
#[test_case(Packet::pubrec(7), &[0x50, 0x02, 0x00, 0x07]; "pubrec")]
#[test_case(Packet::pubrel(7), &[0x62, 0x02, 0x00, 0x07]; "pubrel")]
#[test_case(Packet::pubcomp(7), &[0x70, 0x02, 0x00, 0x07]; "pubcomp")]
#[test_case(Packet::unsuback(7), &[0xB0, 0x02, 0x00, 0x07]; "unsuback")]
#[test_case(Packet::suback(7, 1), &[0x90, 0x03, 0x00, 0x07, 0x01]; "suback")]
#[test_case(Packet::connack(true, 0), &[0x20, 0x02, 0x01, 0x00]; "connack")]
#[test_case(Packet::pingresp(), &[0xD0, 0x00]; "pingresp")]
#[test_case(Packet::pingreq(), &[0xC0, 0x00]; "pingreq")]
#[test_case(Packet::disconnect(), &[0xE0, 0x00]; "disconnect")]
fn test_response_wire_format(packet: Packet, wire: &[u8]) {
    assert_eq!(encode(packet.clone()).as_ref(), wire);

    let decoded = Packet::decode(wire).unwrap();
    assert_eq!(decoded.packet_type(), packet.packet_type());
    assert_eq!(decoded.packet_id(), packet.packet_id());
    assert_eq!(decoded.header.remaining_length(), wire.len() - 2);
}

#[test]
fn test_subscribe_wire_format() {
    let bytes = encode(Packet::subscribe(10, "a/b", QoS::AtLeastOnce));
    assert_eq!(
        bytes.as_ref(),
        &[0x82, 0x08, 0x00, 0x0A, 0x00, 0x03, b'a', b'/', b'b', 0x01]
    );
}

#[test]
fn test_unsubscribe_wire_format() {
    let bytes = encode(Packet::unsubscribe(10, "a/b"));
    assert_eq!(
        bytes.as_ref(),
        &[0xA2, 0x07, 0x00, 0x0A, 0x00, 0x03, b'a', b'/', b'b']
    );
}

#[test]
fn test_decode_connack_fields() {
    let packet = Packet::decode(&[0x20, 0x02, 0x01, 0x04]).unwrap();
    assert_eq!(packet.packet_type(), Some(PacketType::ConnAck));
    assert_eq!(packet.session_present(), Some(true));
    assert_eq!(packet.return_code(), Some(4));
}

#[test]
fn test_decode_suback_granted_qos() {
    let packet = Packet::decode(&[0x90, 0x03, 0x12, 0x34, 0x80]).unwrap();
    assert_eq!(packet.packet_id(), Some(0x1234));
    assert_eq!(packet.granted_qos(), Some(0x80));
}

#[test]
fn test_decode_rejects_bad_flags() {
    // PUBREL must carry 0b0010 in the low nibble
    assert_eq!(
        Packet::decode(&[0x60, 0x02, 0x00, 0x01]),
        Err(DecodeError::InvalidFlags)
    );
}

#[test]
fn test_decode_rejects_packet_type_zero() {
    assert_eq!(
        Packet::decode(&[0x00, 0x00]),
        Err(DecodeError::InvalidPacketType(0))
    );
}

#[test]
fn test_decode_unsupported_inbound_types() {
    let publish = encode(Packet::publish("t", None, "x", QoS::AtMostOnce, false, false));
    assert_eq!(
        Packet::decode(&publish),
        Err(DecodeError::UnsupportedPacketType(PacketType::Publish))
    );
}

#[test]
fn test_decode_truncated() {
    assert_eq!(
        Packet::decode(&[0x40, 0x02, 0x00]),
        Err(DecodeError::InsufficientData)
    );
}

proptest! {
    #[test]
    fn prop_packet_length_invariant(
        topic in "[a-z/]{1,40}",
        message in proptest::collection::vec(any::<u8>(), 0..400),
        qos in 0u8..3,
        id in 1u16..(1 << 15),
    ) {
        let qos = QoS::from_u8(qos).unwrap();
        let packet_id = (qos != QoS::AtMostOnce).then_some(id);
        let packet = Packet::publish(&topic, packet_id, message.clone(), qos, false, false);
        let vh_len = packet.variable_header.as_ref().unwrap().to_bytes().unwrap().len();
        let p_len = packet.payload.as_ref().unwrap().to_bytes().unwrap().len();

        let bytes = encode(packet);
        let (header_len, header) = FixedHeader::decode(&bytes).unwrap();
        prop_assert_eq!(header.remaining_length(), vh_len + p_len);
        prop_assert_eq!(bytes.len(), header_len + vh_len + p_len);
    }
}

#[test]
fn test_debug_render_sections() {
    let rendered = Packet::subscribe(1, "a", QoS::AtMostOnce).debug_render();
    assert!(rendered.starts_with("======== SUBSCRIBE ========"));
    assert!(rendered.contains("-- header --"));
    assert!(rendered.contains("-- variable header --"));
    assert!(rendered.contains("-- payload --"));
    assert!(rendered.contains("string: a"));

    let ping = Packet::pingreq().debug_render();
    assert!(ping.contains("no variable header"));
    assert!(ping.contains("no payload"));
}

// ============================================================================
// Framing
// ============================================================================

#[test]
fn test_frame_buffer_waits_for_whole_frame() {
    let mut frames = FrameBuffer::new();
    frames.read_buf().extend_from_slice(&[0x40, 0x02, 0x00]);
    assert_eq!(frames.next_frame().unwrap(), None);

    frames.read_buf().extend_from_slice(&[0x05, 0xD0, 0x00, 0x90]);
    let first = frames.next_frame().unwrap().unwrap();
    assert_eq!(first.packet_type(), Some(PacketType::PubAck));
    assert_eq!(first.body(), &[0x00, 0x05]);

    let second = frames.next_frame().unwrap().unwrap();
    assert_eq!(second.packet_type(), Some(PacketType::PingResp));
    assert!(second.body().is_empty());

    assert_eq!(frames.next_frame().unwrap(), None);
    assert_eq!(frames.len(), 1);
}

#[test]
fn test_frame_buffer_malformed_length() {
    let mut frames = FrameBuffer::new();
    frames
        .read_buf()
        .extend_from_slice(&[0x30, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]);
    assert_eq!(frames.next_frame(), Err(DecodeError::MalformedLength));
}

#[test]
fn test_inbound_publish_parse() {
    let mut frames = FrameBuffer::new();
    let bytes = encode(Packet::publish(
        "sensors/temp",
        Some(42),
        "21.5",
        QoS::AtLeastOnce,
        true,
        true,
    ));
    frames.read_buf().extend_from_slice(&bytes);
    let frame = frames.next_frame().unwrap().unwrap();

    let publish = InboundPublish::parse(&frame).unwrap();
    assert_eq!(publish.topic, "sensors/temp");
    assert_eq!(publish.packet_id, Some(42));
    assert_eq!(publish.payload.as_ref(), b"21.5");
    assert_eq!(publish.qos, QoS::AtLeastOnce);
    assert!(publish.dup);
    assert!(publish.retain);
}

#[test]
fn test_inbound_publish_qos0_has_no_packet_id() {
    let mut frames = FrameBuffer::new();
    let bytes = encode(Packet::publish("t", None, vec![0x00, 0x01], QoS::AtMostOnce, false, false));
    frames.read_buf().extend_from_slice(&bytes);
    let frame = frames.next_frame().unwrap().unwrap();

    let publish = InboundPublish::parse(&frame).unwrap();
    assert_eq!(publish.packet_id, None);
    assert_eq!(publish.payload.as_ref(), &[0x00, 0x01]);
}

#[test]
fn test_inbound_publish_rejects_qos3() {
    let mut frames = FrameBuffer::new();
    frames
        .read_buf()
        .extend_from_slice(&[0x36, 0x03, 0x00, 0x01, b't']);
    let frame = frames.next_frame().unwrap().unwrap();
    assert_eq!(
        InboundPublish::parse(&frame),
        Err(DecodeError::InvalidFlags)
    );
}
