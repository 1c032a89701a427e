use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use lockdown_runtime::ipc::codec::{to_line, IpcCodec, MAX_LINE_BYTES};
use lockdown_runtime::ipc::protocol::IpcResponse;
use lockdown_runtime::AppError;

#[test]
fn decodes_complete_lines_only() {
    let mut codec = IpcCodec::new();
    let mut buf = BytesMut::from(&b"{\"ok\":true}\n{\"ok\":"[..]);

    assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("{\"ok\":true}"));
    assert_eq!(codec.decode(&mut buf).unwrap(), None);

    buf.extend_from_slice(b"false}\n");
    assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("{\"ok\":false}"));
}

#[test]
fn rejects_oversized_line() {
    let mut codec = IpcCodec::new();
    let mut buf = BytesMut::from(vec![b'a'; MAX_LINE_BYTES + 1].as_slice());

    let err = codec.decode(&mut buf).unwrap_err();
    assert!(matches!(err, AppError::Ipc(ref msg) if msg.contains("line too long")));
}

#[test]
fn encode_appends_newline() {
    let mut codec = IpcCodec::new();
    let mut buf = BytesMut::new();
    codec.encode("{\"ok\":true}".to_owned(), &mut buf).unwrap();
    assert_eq!(&buf[..], b"{\"ok\":true}\n");
}

#[test]
fn to_line_produces_single_json_line() {
    let line = to_line(&IpcResponse::error("unauthorized")).unwrap();
    let text = String::from_utf8(line).unwrap();

    assert!(text.ends_with('\n'));
    assert_eq!(text.matches('\n').count(), 1);
    assert_eq!(text.trim(), r#"{"ok":false,"error":"unauthorized"}"#);
}
