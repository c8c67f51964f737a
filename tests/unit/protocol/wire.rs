use super::*;
use crate::protocol::op::LineJoin;

#[test]
fn primitives_are_little_endian() {
    let mut buf = Vec::new();
    buf.put_u16(0x0102);
    buf.put_u32(0x0304_0506);
    buf.put_f32(1.0);
    assert_eq!(&buf[..6], &[0x02, 0x01, 0x06, 0x05, 0x04, 0x03]);
    assert_eq!(&buf[6..], &1.0f32.to_le_bytes());

    let mut r = SegmentReader::new(&buf);
    assert_eq!(r.u16().unwrap(), 0x0102);
    assert_eq!(r.u32().unwrap(), 0x0304_0506);
    assert_eq!(r.f32().unwrap(), 1.0);
    assert!(r.is_at_end());
}

#[test]
fn text_keeps_surrogate_pairs_verbatim() {
    let s = "a\u{1F600}b";
    let mut buf = Vec::new();
    buf.put_text(s);
    assert_eq!(buf.len(), text_len(4));
    assert_eq!(&buf[..4], &4u32.to_le_bytes());
    assert_eq!(u16::from_le_bytes([buf[6], buf[7]]), 0xD83D);
    assert_eq!(u16::from_le_bytes([buf[8], buf[9]]), 0xDE00);

    let mut r = SegmentReader::new(&buf);
    assert_eq!(r.text().unwrap(), s);
}

#[test]
fn short_read_reports_offset_and_shortfall() {
    let buf = [1u8, 2, 3];
    let mut r = SegmentReader::new(&buf);
    r.u8().unwrap();
    let err = r.u32().unwrap_err();
    assert_eq!(
        err,
        DecodeError::UnexpectedEof {
            offset: 1,
            needed: 2
        }
    );
}

#[test]
fn truncated_text_body_is_eof() {
    let mut buf = Vec::new();
    buf.put_u32(10);
    buf.put_u16(b'x' as u16);
    let mut r = SegmentReader::new(&buf);
    assert!(matches!(
        r.text(),
        Err(DecodeError::UnexpectedEof { offset: 4, needed: 18 })
    ));
}

#[test]
fn unknown_enum_tag_names_the_field() {
    let buf = [9u8];
    let mut r = SegmentReader::new(&buf);
    let err = r.enum_tag::<LineJoin>().unwrap_err();
    assert_eq!(
        err,
        DecodeError::UnknownTag {
            what: "line join",
            tag: 9,
            offset: 0
        }
    );
}

#[test]
fn truncate_never_splits_a_pair() {
    let s = "ab\u{1F600}c";
    assert_eq!(truncate_utf16(s, 10), s);
    assert_eq!(truncate_utf16(s, 3), "ab");
    assert_eq!(truncate_utf16(s, 4), "ab\u{1F600}");
    assert_eq!(truncate_utf16(s, 0), "");
}
