//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Integration tests for RFC 2066 charset negotiation.

use mudgate_telnet::consts::{self, charset, DO, DONT, IAC, SB, SE, WILL, WONT};
use mudgate_telnet::{
    CharsetHandler, Context, Event, Payload, TelnetConnection, TelnetError, TextEncoding,
    EVENT_CHARSET_ACCEPTED, EVENT_CHARSET_REJECTED, EVENT_SEND,
};
use std::sync::{Arc, Mutex};

const CHARSET: u8 = consts::option::CHARSET;
const BINARY: u8 = consts::option::TRANSMIT_BINARY;

type Conn = TelnetConnection<&'static [u8], Vec<u8>>;

fn connection_with_handler(is_server: bool) -> (Conn, Context, CharsetHandler) {
    let conn = TelnetConnection::from_split(&b""[..], Vec::new());
    let ctx = conn.context();
    let handler = CharsetHandler::new(is_server);
    conn.register_handler(Arc::new(handler.clone())).unwrap();
    // Bring the option up in both directions.
    ctx.dispatch(Event::negotiation(DO, CHARSET)).unwrap();
    ctx.dispatch(Event::negotiation(WILL, CHARSET)).unwrap();
    (conn, ctx, handler)
}

fn capture_sends(ctx: &Context) -> Arc<Mutex<Vec<Vec<u8>>>> {
    let sends = Arc::new(Mutex::new(Vec::new()));
    let sends2 = Arc::clone(&sends);
    ctx.bus().listen_fn(EVENT_SEND, move |_, ev| {
        if let Payload::Raw(bytes) = &ev.payload {
            sends2.lock().unwrap().push(bytes.clone());
        }
        Ok(())
    });
    sends
}

fn capture_charset_events(ctx: &Context) -> Arc<Mutex<Vec<Event>>> {
    let store = Arc::new(Mutex::new(Vec::new()));
    for name in [EVENT_CHARSET_ACCEPTED, EVENT_CHARSET_REJECTED] {
        let store2 = Arc::clone(&store);
        ctx.bus().listen_fn(name, move |_, ev| {
            store2.lock().unwrap().push(ev.clone());
            Ok(())
        });
    }
    store
}

fn subneg(data: Vec<u8>) -> Event {
    Event::subnegotiation(CHARSET, data)
}

fn rejected_bytes() -> Vec<u8> {
    vec![IAC, SB, CHARSET, charset::REJECTED, IAC, SE]
}

// ============================================================================
// Subnegotiation handling
// ============================================================================

#[tokio::test]
async fn charset_subnegotiation_table() {
    let (_conn, ctx, _handler) = connection_with_handler(false);
    let sends = capture_sends(&ctx);
    let events = capture_charset_events(&ctx);

    struct Case {
        data: Vec<u8>,
        expected_send: Option<Vec<u8>>,
        expected_event: Option<Event>,
    }
    let accepted = |name: &str| {
        let mut out = vec![IAC, SB, CHARSET, charset::ACCEPTED];
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&[IAC, SE]);
        out
    };
    let cases = vec![
        Case {
            data: vec![charset::REQUEST],
            expected_send: Some(rejected_bytes()),
            expected_event: None,
        },
        Case {
            data: [&[charset::REQUEST][..], b";"].concat(),
            expected_send: Some(rejected_bytes()),
            expected_event: None,
        },
        Case {
            data: [&[charset::REQUEST][..], b"[TTABLE]\x01"].concat(),
            expected_send: Some(rejected_bytes()),
            expected_event: None,
        },
        Case {
            data: [&[charset::REQUEST][..], b"[TTABLE]\x01;"].concat(),
            expected_send: Some(rejected_bytes()),
            expected_event: None,
        },
        Case {
            data: [&[charset::REQUEST][..], b";BOGUS;ENCODING;NAMES"].concat(),
            expected_send: Some(rejected_bytes()),
            expected_event: None,
        },
        Case {
            data: [&[charset::REQUEST][..], b";US-ASCII;BOGUS"].concat(),
            expected_send: Some(accepted("US-ASCII")),
            expected_event: Some(Event::charset_accepted(TextEncoding::Ascii)),
        },
        Case {
            data: [&[charset::REQUEST][..], b";UTF-8;US-ASCII"].concat(),
            expected_send: Some(accepted("UTF-8")),
            expected_event: Some(Event::charset_accepted(TextEncoding::utf8())),
        },
        Case {
            data: [&[charset::REQUEST][..], b"[TTABLE]\x01;UTF-8;US-ASCII"].concat(),
            expected_send: Some(accepted("UTF-8")),
            expected_event: Some(Event::charset_accepted(TextEncoding::utf8())),
        },
        Case {
            data: vec![charset::REJECTED],
            expected_send: None,
            expected_event: Some(Event::charset_rejected()),
        },
        Case {
            data: [&[charset::ACCEPTED][..], b"ISO-8859-1"].concat(),
            expected_send: None,
            expected_event: Some(Event::charset_accepted(TextEncoding::Charset(
                encoding_rs::WINDOWS_1252,
            ))),
        },
        Case {
            data: vec![charset::TTABLE_IS, 1, b';'],
            expected_send: Some(vec![IAC, SB, CHARSET, charset::TTABLE_REJECTED, IAC, SE]),
            expected_event: None,
        },
    ];

    for (i, case) in cases.into_iter().enumerate() {
        sends.lock().unwrap().clear();
        events.lock().unwrap().clear();
        ctx.dispatch(subneg(case.data.clone())).unwrap();
        let sent = sends.lock().unwrap();
        match case.expected_send {
            Some(bytes) => assert_eq!(sent.as_slice(), &[bytes], "case {i}"),
            None => assert!(sent.is_empty(), "case {i}: {sent:?}"),
        }
        let seen = events.lock().unwrap();
        match case.expected_event {
            Some(ev) => assert_eq!(seen.as_slice(), &[ev], "case {i}"),
            None => assert!(seen.is_empty(), "case {i}: {seen:?}"),
        }
    }
}

#[tokio::test]
async fn subnegotiations_ignored_until_option_enabled() {
    let conn: Conn = TelnetConnection::from_split(&b""[..], Vec::new());
    let ctx = conn.context();
    let handler = CharsetHandler::new(false);
    conn.register_handler(Arc::new(handler)).unwrap();
    let sends = capture_sends(&ctx);
    ctx.dispatch(subneg([&[charset::REQUEST][..], b";UTF-8"].concat()))
        .unwrap();
    assert!(sends.lock().unwrap().is_empty());
}

#[tokio::test]
async fn empty_subnegotiation_is_ignored() {
    let (_conn, ctx, _handler) = connection_with_handler(false);
    let sends = capture_sends(&ctx);
    ctx.dispatch(subneg(Vec::new())).unwrap();
    assert!(sends.lock().unwrap().is_empty());
}

#[tokio::test]
async fn accepted_with_unknown_name_rejects() {
    let (_conn, ctx, _handler) = connection_with_handler(false);
    let events = capture_charset_events(&ctx);
    ctx.dispatch(subneg([&[charset::ACCEPTED][..], b"BOGUS"].concat()))
        .unwrap();
    assert_eq!(
        events.lock().unwrap().as_slice(),
        &[Event::charset_rejected()]
    );
}

// ============================================================================
// Requesting encodings
// ============================================================================

#[tokio::test]
async fn request_encoding_requires_enabled_option() {
    let conn: Conn = TelnetConnection::from_split(&b""[..], Vec::new());
    let ctx = conn.context();
    let handler = CharsetHandler::new(false);
    conn.register_handler(Arc::new(handler.clone())).unwrap();
    let err = handler
        .request_encoding(&ctx, &[TextEncoding::utf8()])
        .unwrap_err();
    assert!(matches!(err, TelnetError::OptionNotEnabled { option } if option == CHARSET));
}

#[tokio::test]
async fn request_encoding_serializes_names() {
    let (_conn, ctx, handler) = connection_with_handler(false);
    let sends = capture_sends(&ctx);
    handler
        .request_encoding(&ctx, &[TextEncoding::utf8(), TextEncoding::Ascii])
        .unwrap();
    let expected = [
        &[IAC, SB, CHARSET, charset::REQUEST][..],
        b";UTF-8;US-ASCII",
        &[IAC, SE][..],
    ]
    .concat();
    assert_eq!(sends.lock().unwrap().as_slice(), &[expected]);
}

#[tokio::test]
async fn request_encoding_rejects_identity() {
    let (_conn, ctx, handler) = connection_with_handler(false);
    let err = handler
        .request_encoding(&ctx, &[TextEncoding::Binary])
        .unwrap_err();
    assert!(matches!(err, TelnetError::UnknownEncoding { .. }));
}

#[tokio::test]
async fn server_rejects_simultaneous_request() {
    let (_conn, ctx, handler) = connection_with_handler(true);
    let sends = capture_sends(&ctx);
    let events = capture_charset_events(&ctx);
    handler
        .request_encoding(&ctx, &[TextEncoding::utf8()])
        .unwrap();
    sends.lock().unwrap().clear();
    ctx.dispatch(subneg([&[charset::REQUEST][..], b";UTF-8"].concat()))
        .unwrap();
    assert_eq!(sends.lock().unwrap().as_slice(), &[rejected_bytes()]);
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn client_yields_to_crossing_request() {
    let (_conn, ctx, handler) = connection_with_handler(false);
    let sends = capture_sends(&ctx);
    let events = capture_charset_events(&ctx);
    handler
        .request_encoding(&ctx, &[TextEncoding::Ascii])
        .unwrap();
    sends.lock().unwrap().clear();
    ctx.dispatch(subneg([&[charset::REQUEST][..], b";UTF-8"].concat()))
        .unwrap();
    // The dropped client request is surfaced, then the peer's request is
    // honored.
    assert_eq!(
        events.lock().unwrap().as_slice(),
        &[
            Event::charset_rejected(),
            Event::charset_accepted(TextEncoding::utf8()),
        ]
    );
    let accepted = [
        &[IAC, SB, CHARSET, charset::ACCEPTED][..],
        b"UTF-8",
        &[IAC, SE][..],
    ]
    .concat();
    assert_eq!(sends.lock().unwrap().as_slice(), &[accepted]);
}

#[tokio::test]
async fn peer_acceptance_clears_pending_request() {
    let (_conn, ctx, handler) = connection_with_handler(true);
    let events = capture_charset_events(&ctx);
    handler
        .request_encoding(&ctx, &[TextEncoding::utf8()])
        .unwrap();
    ctx.dispatch(subneg([&[charset::ACCEPTED][..], b"UTF-8"].concat()))
        .unwrap();
    assert_eq!(
        events.lock().unwrap().as_slice(),
        &[Event::charset_accepted(TextEncoding::utf8())]
    );
    // With nothing pending any more, a fresh peer request is processed
    // instead of being treated as a collision.
    let sends = capture_sends(&ctx);
    ctx.dispatch(subneg([&[charset::REQUEST][..], b";US-ASCII"].concat()))
        .unwrap();
    let accepted = [
        &[IAC, SB, CHARSET, charset::ACCEPTED][..],
        b"US-ASCII",
        &[IAC, SE][..],
    ]
    .concat();
    assert_eq!(sends.lock().unwrap().as_slice(), &[accepted]);
}

// ============================================================================
// Applying the negotiated encoding
// ============================================================================

fn enable_binary(ctx: &Context) {
    ctx.options().allow(BINARY, true, true);
    ctx.dispatch(Event::negotiation(DO, BINARY)).unwrap();
    ctx.dispatch(Event::negotiation(WILL, BINARY)).unwrap();
}

#[tokio::test]
async fn acceptance_alone_leaves_ascii() {
    let (_conn, ctx, _handler) = connection_with_handler(false);
    ctx.dispatch(Event::charset_accepted(TextEncoding::utf8()))
        .unwrap();
    assert_eq!(ctx.read_encoding(), TextEncoding::Ascii);
    assert_eq!(ctx.write_encoding(), TextEncoding::Ascii);
}

#[tokio::test]
async fn acceptance_then_binary_applies_encoding() {
    let (_conn, ctx, _handler) = connection_with_handler(false);
    ctx.dispatch(Event::charset_accepted(TextEncoding::utf8()))
        .unwrap();
    enable_binary(&ctx);
    assert_eq!(ctx.read_encoding(), TextEncoding::utf8());
    assert_eq!(ctx.write_encoding(), TextEncoding::utf8());
}

#[tokio::test]
async fn binary_then_acceptance_applies_encoding() {
    let (_conn, ctx, _handler) = connection_with_handler(false);
    enable_binary(&ctx);
    ctx.dispatch(Event::charset_accepted(TextEncoding::utf8()))
        .unwrap();
    assert_eq!(ctx.read_encoding(), TextEncoding::utf8());
    assert_eq!(ctx.write_encoding(), TextEncoding::utf8());
}

#[tokio::test]
async fn losing_binary_on_our_side_reverts_to_ascii() {
    let (_conn, ctx, _handler) = connection_with_handler(false);
    enable_binary(&ctx);
    ctx.dispatch(Event::charset_accepted(TextEncoding::utf8()))
        .unwrap();
    ctx.dispatch(Event::negotiation(DONT, BINARY)).unwrap();
    assert_eq!(ctx.read_encoding(), TextEncoding::Ascii);
    assert_eq!(ctx.write_encoding(), TextEncoding::Ascii);
}

#[tokio::test]
async fn losing_binary_on_their_side_reverts_to_ascii() {
    let (_conn, ctx, _handler) = connection_with_handler(false);
    enable_binary(&ctx);
    ctx.dispatch(Event::charset_accepted(TextEncoding::utf8()))
        .unwrap();
    ctx.dispatch(Event::negotiation(WONT, BINARY)).unwrap();
    assert_eq!(ctx.read_encoding(), TextEncoding::Ascii);
    assert_eq!(ctx.write_encoding(), TextEncoding::Ascii);
}
