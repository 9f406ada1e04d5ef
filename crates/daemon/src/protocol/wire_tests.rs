// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tokio::io::BufReader;

#[tokio::test]
async fn lines_are_read_without_terminators() {
    let input = "{\"a\":1}\r\n{\"b\":2}\nrest";
    let mut reader = BufReader::new(input.as_bytes());
    let mut buf = Vec::new();

    assert_eq!(
        read_line(&mut reader, &mut buf).await.unwrap().as_deref(),
        Some("{\"a\":1}")
    );
    assert_eq!(
        read_line(&mut reader, &mut buf).await.unwrap().as_deref(),
        Some("{\"b\":2}")
    );
    assert_eq!(
        read_line(&mut reader, &mut buf).await.unwrap().as_deref(),
        Some("rest")
    );
    assert_eq!(read_line(&mut reader, &mut buf).await.unwrap(), None);
}

#[tokio::test]
async fn oversized_line_is_rejected_and_skipped() {
    let mut input = vec![b'x'; MAX_LINE_BYTES + 5];
    input.push(b'\n');
    input.extend_from_slice(b"{\"ok\":true}\n");

    let mut reader = BufReader::new(input.as_slice());
    let mut buf = Vec::new();

    match read_line(&mut reader, &mut buf).await {
        Err(WireError::LineTooLong { max }) => assert_eq!(max, MAX_LINE_BYTES),
        other => panic!("unexpected: {:?}", other),
    }
    assert_eq!(
        read_line(&mut reader, &mut buf).await.unwrap().as_deref(),
        Some("{\"ok\":true}")
    );
}

#[tokio::test]
async fn write_line_appends_newline() {
    let mut out = Vec::new();
    write_line(&mut out, &serde_json::json!({"success": true}))
        .await
        .unwrap();
    assert_eq!(out, b"{\"success\":true}\n");
}
