//! The `alp://` line protocol.
//!
//! One frame per `\n`-terminated line. A request may carry its message id
//! as an `?id=N` query.
//!
//! Outgoing:
//!
//! | command            | frame                                     |
//! |--------------------|-------------------------------------------|
//! | switch digital pin | `alp://ppsw/{pin}/{0\|1}`                 |
//! | switch analog pin  | `alp://ppin/{pin}/{value}`                |
//! | start listening    | `alp://srla/{pin}`, `alp://srld/{pin}`    |
//! | stop listening     | `alp://spla/{pin}`, `alp://spld/{pin}`    |
//! | custom             | `alp://cust/{part}/{part}..`              |
//! | tone               | `alp://tone/{pin}/{hz}/{ms\|-1}`          |
//! | no tone            | `alp://notn/{pin}`                        |
//! | key press          | `alp://kprs/chr{c}cod{n}loc{n}mod{n}mex{n}` |
//!
//! Incoming: `alp://ared/{pin}/{value}`, `alp://dred/{pin}/{0|1}`,
//! `alp://rply/{ok|ko}?id=N[&key=value..]`, `alp://cevnt/{message}` and
//! the ready marker `alp://ready/`.

use crate::codec::{Codec, Decoded, Inbound};
use crate::{
    AnalogPin, Command, CustomEvent, DigitalPin, LinkError, Pin, PinValueChangedEvent,
    ReplyEvent, Request, Result,
};
use bytes::{BufMut, BytesMut};
use std::fmt::Write as _;

const SCHEME: &str = "alp://";
const READY_MARKER: &str = "alp://ready/";

/// Longest line accepted before the buffer is discarded to resynchronize.
pub const MAX_FRAME_LEN: usize = 1024;

/// Codec for the `alp://` text protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlpCodec;

impl AlpCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Codec for AlpCodec {
    fn encode(&self, request: &Request, dst: &mut BytesMut) -> Result<()> {
        let mut line = String::with_capacity(32);
        line.push_str(SCHEME);
        match &request.command {
            Command::SwitchDigitalPin { pin, value } => {
                let _ = write!(line, "ppsw/{}/{}", pin.0, u8::from(*value));
            }
            Command::SwitchAnalogPin { pin, value } => {
                let _ = write!(line, "ppin/{}/{}", pin.0, value);
            }
            Command::StartListening(pin) => {
                let _ = match pin {
                    Pin::Analog(n) => write!(line, "srla/{}", n),
                    Pin::Digital(n) => write!(line, "srld/{}", n),
                };
            }
            Command::StopListening(pin) => {
                let _ = match pin {
                    Pin::Analog(n) => write!(line, "spla/{}", n),
                    Pin::Digital(n) => write!(line, "spld/{}", n),
                };
            }
            Command::Custom(parts) => {
                if let Some(bad) = parts.iter().find(|p| p.contains(['\n', '\r', '?'])) {
                    return Err(LinkError::Codec(format!(
                        "custom message part {:?} contains a reserved character",
                        bad
                    )));
                }
                line.push_str("cust/");
                line.push_str(&parts.join("/"));
            }
            Command::Tone(tone) => {
                let duration = tone
                    .duration
                    .map(|d| d.as_millis() as i64)
                    .unwrap_or(-1);
                let _ = write!(line, "tone/{}/{}/{}", tone.pin.0, tone.hertz, duration);
            }
            Command::NoTone(pin) => {
                let _ = write!(line, "notn/{}", pin.0);
            }
            Command::KeyPress(key) => {
                let _ = write!(
                    line,
                    "kprs/chr{}cod{}loc{}mod{}mex{}",
                    key.key_char,
                    key.key_code,
                    key.key_location,
                    key.key_modifiers,
                    key.key_modifiers_ex
                );
            }
        }
        if let Some(id) = request.message_id {
            let _ = write!(line, "?id={}", id);
        }
        line.push('\n');

        dst.reserve(line.len());
        dst.put_slice(line.as_bytes());
        Ok(())
    }

    fn decode(&self, src: &mut BytesMut) -> Decoded {
        loop {
            let Some(end) = src.iter().position(|b| *b == b'\n') else {
                if src.len() > MAX_FRAME_LEN {
                    let dropped = src.len();
                    src.clear();
                    return Decoded::Unrecognized(format!(
                        "discarded {} bytes without a line terminator",
                        dropped
                    ));
                }
                return Decoded::NeedMore;
            };

            let frame = src.split_to(end + 1);
            let line = match std::str::from_utf8(&frame[..end]) {
                Ok(s) => s.trim_end_matches('\r'),
                Err(_) => return Decoded::Unrecognized("frame is not valid utf-8".to_string()),
            };
            if line.is_empty() {
                continue;
            }
            return match parse_line(line) {
                Some(msg) => Decoded::Frame(msg),
                None => Decoded::Unrecognized(line.to_string()),
            };
        }
    }
}

fn parse_line(line: &str) -> Option<Inbound> {
    if line == READY_MARKER {
        return Some(Inbound::Ready);
    }
    let rest = line.strip_prefix(SCHEME)?;
    // Custom event bodies are opaque, '?' included.
    if let Some(message) = rest.strip_prefix("cevnt/") {
        return (!message.is_empty()).then(|| Inbound::Custom(CustomEvent::new(message)));
    }
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    let (verb, args) = path.split_once('/')?;

    match verb {
        "ared" => {
            let (pin, value) = args.split_once('/')?;
            Some(Inbound::PinValueChanged(PinValueChangedEvent::analog(
                AnalogPin(pin.parse().ok()?),
                value.parse().ok()?,
            )))
        }
        "dred" => {
            let (pin, value) = args.split_once('/')?;
            let value = match value {
                "1" => true,
                "0" => false,
                _ => return None,
            };
            Some(Inbound::PinValueChanged(PinValueChangedEvent::digital(
                DigitalPin(pin.parse().ok()?),
                value,
            )))
        }
        "rply" => {
            let ok = match args {
                "ok" => true,
                "ko" => false,
                _ => return None,
            };
            let mut id = None;
            let mut reply_params = Vec::new();
            for (key, value) in url::form_urlencoded::parse(query?.as_bytes()) {
                if key == "id" {
                    id = Some(value.parse::<u64>().ok()?);
                } else {
                    reply_params.push((key.into_owned(), value.into_owned()));
                }
            }
            let mut reply = ReplyEvent::new(id?, ok);
            reply.params.extend(reply_params);
            Some(Inbound::Reply(reply))
        }
        _ => None,
    }
}

#[cfg(test)]
mod alp_tests {
    use super::*;
    use crate::{KeyPress, Tone};
    use std::time::Duration;

    fn encode(request: impl Into<Request>) -> String {
        let mut buf = BytesMut::new();
        AlpCodec.encode(&request.into(), &mut buf).unwrap();
        String::from_utf8(buf.to_vec()).unwrap()
    }

    fn decode_all(input: &str) -> Vec<Decoded> {
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        loop {
            match AlpCodec.decode(&mut buf) {
                Decoded::NeedMore => return out,
                d => out.push(d),
            }
        }
    }

    #[test]
    fn test_encode_commands() {
        assert_eq!(
            encode(Command::SwitchDigitalPin { pin: DigitalPin(3), value: true }),
            "alp://ppsw/3/1\n"
        );
        assert_eq!(
            encode(Command::SwitchAnalogPin { pin: AnalogPin(5), value: 128 }),
            "alp://ppin/5/128\n"
        );
        assert_eq!(encode(Command::StartListening(Pin::analog(1))), "alp://srla/1\n");
        assert_eq!(encode(Command::StartListening(Pin::digital(2))), "alp://srld/2\n");
        assert_eq!(encode(Command::StopListening(Pin::analog(1))), "alp://spla/1\n");
        assert_eq!(encode(Command::StopListening(Pin::digital(2))), "alp://spld/2\n");
        assert_eq!(encode(Command::custom(["led", "on"])), "alp://cust/led/on\n");
        assert_eq!(encode(Command::NoTone(AnalogPin(0))), "alp://notn/0\n");
        assert_eq!(
            encode(Command::Tone(Tone::new(AnalogPin(2), 440))),
            "alp://tone/2/440/-1\n"
        );
        assert_eq!(
            encode(Command::Tone(
                Tone::new(AnalogPin(2), 440).with_duration(Duration::from_millis(250))
            )),
            "alp://tone/2/440/250\n"
        );
        assert_eq!(
            encode(Command::KeyPress(KeyPress::new('a', 65))),
            "alp://kprs/chracod65loc0mod0mex0\n"
        );
    }

    #[test]
    fn test_encode_message_id() {
        let req = Request::new(Command::NoTone(AnalogPin(0))).with_message_id(42);
        assert_eq!(encode(req), "alp://notn/0?id=42\n");
    }

    #[test]
    fn test_encode_rejects_reserved_characters() {
        let mut buf = BytesMut::new();
        let err = AlpCodec
            .encode(&Command::custom(["bad\nline"]).into(), &mut buf)
            .unwrap_err();
        assert!(matches!(err, LinkError::Codec(_)));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_pin_events() {
        let decoded = decode_all("alp://ared/1/512\nalp://dred/7/1\nalp://dred/7/0\n");
        assert_eq!(
            decoded,
            vec![
                Decoded::Frame(Inbound::PinValueChanged(PinValueChangedEvent::analog(AnalogPin(1), 512))),
                Decoded::Frame(Inbound::PinValueChanged(PinValueChangedEvent::digital(DigitalPin(7), true))),
                Decoded::Frame(Inbound::PinValueChanged(PinValueChangedEvent::digital(DigitalPin(7), false))),
            ]
        );
    }

    #[test]
    fn test_decode_reply() {
        let decoded = decode_all("alp://rply/ok?id=12&state=on\nalp://rply/ko?id=13\n");
        assert_eq!(
            decoded,
            vec![
                Decoded::Frame(Inbound::Reply(ReplyEvent::new(12, true).with_param("state", "on"))),
                Decoded::Frame(Inbound::Reply(ReplyEvent::new(13, false))),
            ]
        );
    }

    #[test]
    fn test_decode_reply_without_id_is_unrecognized() {
        assert!(matches!(
            decode_all("alp://rply/ok\n").as_slice(),
            [Decoded::Unrecognized(_)]
        ));
        assert!(matches!(
            decode_all("alp://rply/ok?id=x\n").as_slice(),
            [Decoded::Unrecognized(_)]
        ));
    }

    #[test]
    fn test_decode_custom_event() {
        assert_eq!(
            decode_all("alp://cevnt/temp/21.5\n"),
            vec![Decoded::Frame(Inbound::Custom(CustomEvent::new("temp/21.5")))]
        );
    }

    #[test]
    fn test_decode_custom_event_keeps_query_chars() {
        assert_eq!(
            decode_all("alp://cevnt/what?now\n"),
            vec![Decoded::Frame(Inbound::Custom(CustomEvent::new("what?now")))]
        );
        assert_eq!(
            decode_all("alp://cevnt/a?id=3&b=c\n"),
            vec![Decoded::Frame(Inbound::Custom(CustomEvent::new("a?id=3&b=c")))]
        );
        assert!(matches!(
            decode_all("alp://cevnt/\n").as_slice(),
            [Decoded::Unrecognized(_)]
        ));
    }

    #[test]
    fn test_ready_marker_is_exact() {
        assert_eq!(decode_all("alp://ready/\n"), vec![Decoded::Frame(Inbound::Ready)]);
        assert_eq!(decode_all("alp://ready/\r\n"), vec![Decoded::Frame(Inbound::Ready)]);

        for corrupted in [
            "alp://XXXXXreadyXXXXX/\n",
            "alp://ready\n",
            "alp://ready/x\n",
            "xalp://ready/\n",
            "alp://readyalp://ready/\n",
        ] {
            assert!(
                matches!(decode_all(corrupted).as_slice(), [Decoded::Unrecognized(_)]),
                "{:?} must not be taken for the ready marker",
                corrupted
            );
        }
    }

    #[test]
    fn test_decode_waits_for_full_frame() {
        let mut buf = BytesMut::from("alp://ared/1/");
        assert_eq!(AlpCodec.decode(&mut buf), Decoded::NeedMore);
        buf.extend_from_slice(b"99\nalp://dr");
        assert_eq!(
            AlpCodec.decode(&mut buf),
            Decoded::Frame(Inbound::PinValueChanged(PinValueChangedEvent::analog(AnalogPin(1), 99)))
        );
        assert_eq!(AlpCodec.decode(&mut buf), Decoded::NeedMore);
        assert_eq!(&buf[..], b"alp://dr");
    }

    #[test]
    fn test_decode_skips_blank_lines() {
        assert_eq!(decode_all("\n\r\nalp://ready/\n"), vec![Decoded::Frame(Inbound::Ready)]);
    }

    #[test]
    fn test_decode_resyncs_after_oversized_garbage() {
        let mut buf = BytesMut::from(vec![b'x'; MAX_FRAME_LEN + 1].as_slice());
        assert!(matches!(AlpCodec.decode(&mut buf), Decoded::Unrecognized(_)));
        assert!(buf.is_empty());

        buf.extend_from_slice(b"alp://ready/\n");
        assert_eq!(AlpCodec.decode(&mut buf), Decoded::Frame(Inbound::Ready));
    }
}
