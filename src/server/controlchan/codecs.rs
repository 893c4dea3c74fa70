use super::{Reply, command::Command, error::ControlChanError, line_parser};

use bytes::BytesMut;
use std::io::Write;
use tokio_util::codec::{Decoder, Encoder};

// FtpCodec implements tokio's `Decoder` and `Encoder` traits for the control
// channel: it decodes FTP commands and encodes their replies.
pub struct FtpCodec {
    // Stored index of the next index to examine for a '\n' character. This
    // is used to optimize searching: if `decode` was called with `abc`, it
    // holds `3` so the next call with `abcde\n` only looks at `de\n`.
    next_index: usize,
}

impl FtpCodec {
    pub fn new() -> Self {
        FtpCodec { next_index: 0 }
    }
}

impl Decoder for FtpCodec {
    type Item = Command;
    type Error = ControlChanError;

    // Decode the incoming bytes into a command: split on newlines and parse
    // the resulting line.
    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Command>, Self::Error> {
        if let Some(newline_offset) = buf[self.next_index..].iter().position(|b| *b == b'\n') {
            let newline_index = newline_offset + self.next_index;
            let line = buf.split_to(newline_index + 1);
            self.next_index = 0;
            Ok(Some(line_parser::parse(line.freeze())?))
        } else {
            self.next_index = buf.len();
            Ok(None)
        }
    }
}

impl Encoder<Reply> for FtpCodec {
    type Error = ControlChanError;

    fn encode(&mut self, reply: Reply, buf: &mut BytesMut) -> Result<(), Self::Error> {
        let mut buffer = vec![];
        match reply {
            Reply::None => {
                return Ok(());
            }
            Reply::CodeAndMsg { code, msg } => {
                if msg.is_empty() {
                    writeln!(buffer, "{}\r", code as u32)?;
                } else {
                    writeln!(buffer, "{} {}\r", code as u32, msg)?;
                }
            }
            Reply::MultiLine { code, mut lines } => {
                // The last line needs to be preceded by the response code.
                let last_line = lines.pop().unwrap_or_default();

                // Lines starting with a digit should be indented
                for it in lines.iter_mut() {
                    if it.chars().next().is_some_and(|c| c.is_ascii_digit()) {
                        it.insert(0, ' ');
                    }
                }
                if lines.is_empty() {
                    writeln!(buffer, "{} {}\r", code as u32, last_line)?;
                } else {
                    write!(buffer, "{}-{}\r\n{} {}\r\n", code as u32, lines.join("\r\n"), code as u32, last_line)?;
                }
            }
        }
        buf.extend(&buffer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::controlchan::ReplyCode;
    use pretty_assertions::assert_eq;

    fn encoded(reply: Reply) -> String {
        let mut codec = FtpCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(reply, &mut buf).unwrap();
        String::from_utf8(buf.to_vec()).unwrap()
    }

    #[test]
    fn encode_single_line() {
        assert_eq!(encoded(Reply::new(ReplyCode::CommandOkay, "Okay")), "200 Okay\r\n");
    }

    #[test]
    fn encode_multi_line() {
        let reply = Reply::new_multiline(ReplyCode::SystemStatus, vec!["Extensions supported:", "UTF8", "End"]);
        assert_eq!(encoded(reply), "211-Extensions supported:\r\nUTF8\r\n211 End\r\n");
    }

    #[test]
    fn decode_across_fragments() {
        let mut codec = FtpCodec::new();
        let mut buf = BytesMut::from(&b"NO"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"OP\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Command::Noop));
    }
}
