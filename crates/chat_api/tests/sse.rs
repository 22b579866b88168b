use chat_api::EventStreamParser;

const BODY: &str = concat!(
    "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"Hé\"}}]}\r\n\r\n",
    ": keep-alive\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"llo 世界\"}}]}\n\n",
    "data: [DONE]\n\n"
);

fn feed_split(body: &[u8], split: usize) -> Vec<String> {
    let mut parser = EventStreamParser::default();
    let mut deltas = parser.feed(&body[..split]);
    deltas.extend(parser.feed(&body[split..]));
    parser.finish();
    deltas
}

#[test]
fn sse_deltas_do_not_depend_on_chunk_boundaries() {
    let body = BODY.as_bytes();
    let expected = EventStreamParser::parse_frames(BODY);
    assert_eq!(expected, vec!["Hé", "llo 世界"]);

    for split in 0..=body.len() {
        assert_eq!(feed_split(body, split), expected, "split at byte {split}");
    }
}

#[test]
fn sse_byte_at_a_time_matches_single_chunk() {
    let mut parser = EventStreamParser::default();
    let mut deltas = Vec::new();
    for byte in BODY.as_bytes() {
        deltas.extend(parser.feed(std::slice::from_ref(byte)));
    }

    assert_eq!(deltas, EventStreamParser::parse_frames(BODY));
    assert!(parser.is_done());
}

#[test]
fn sse_done_in_mid_chunk_ignores_the_rest() {
    let mut parser = EventStreamParser::default();
    let deltas = parser.feed(
        concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"kept\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"after\"}}]}\n\n"
        )
        .as_bytes(),
    );

    assert_eq!(deltas, vec!["kept"]);
    assert!(parser.is_done());
    assert!(parser
        .feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"later\"}}]}\n\n")
        .is_empty());
}

#[test]
fn sse_malformed_frame_does_not_end_the_stream() {
    let payload = concat!(
        "data: {broken-json\n\n",
        "data: {\"no_choices\":true}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\n"
    );

    assert_eq!(EventStreamParser::parse_frames(payload), vec!["x"]);
}

#[test]
fn sse_empty_and_missing_content_yield_nothing() {
    let payload = concat!(
        "data: \n\n",
        "data: {\"choices\":[]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{}}]}\n\n"
    );

    assert!(EventStreamParser::parse_frames(payload).is_empty());
}

#[test]
fn sse_incomplete_trailing_frame_is_dropped_at_end_of_body() {
    let mut parser = EventStreamParser::default();
    assert!(parser
        .feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"nope\"}}]}")
        .is_empty());

    let discarded = parser.finish();
    assert!(discarded > 0);
    assert!(!parser.is_done());
}
