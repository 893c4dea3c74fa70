use super::error::{ParseErrorKind, Result};
use crate::server::controlchan::command::{AuthParam, Command, ModeParam, Opt, StruParam};
use crate::server::password::Password;

use bytes::Bytes;
use std::str;

/// Parse the given bytes into a [`Command`].
#[allow(clippy::cognitive_complexity)]
pub fn parse<T>(line: T) -> Result<Command>
where
    T: AsRef<[u8]> + Into<Bytes>,
{
    let vec = line.into().to_vec();
    let mut iter = vec.splitn(2, |&b| b == b' ' || b == b'\r' || b == b'\n');
    let cmd_token = normalize(iter.next().unwrap())?;
    let cmd_params = Bytes::from(iter.next().unwrap_or(&[]).to_vec());

    let cmd = match &*cmd_token {
        "USER" => {
            let username = parse_to_eol(cmd_params)?;
            if username.is_empty() {
                return Err(ParseErrorKind::InvalidCommand.into());
            }
            Command::User { username }
        }
        "PASS" => {
            let password = parse_to_eol(cmd_params)?;
            Command::Pass {
                password: Password::new(password),
            }
        }
        "ACCT" => {
            let account = parse_to_eol(cmd_params)?;
            Command::Acct {
                account: Password::new(account),
            }
        }
        "SYST" => Command::Syst,
        "STAT" => {
            let params = parse_to_eol(cmd_params)?;
            let path = if params.is_empty() {
                None
            } else {
                Some(String::from_utf8_lossy(&params).to_string())
            };
            Command::Stat { path }
        }
        "TYPE" => {
            // We don't care about text format conversion: we are always in
            // binary mode and ignore the parameter.
            Command::Type
        }
        "STRU" => {
            let params = parse_to_eol(cmd_params)?;
            if params.len() > 1 {
                return Err(ParseErrorKind::InvalidCommand.into());
            }
            match params.first() {
                Some(b'F') => Command::Stru { structure: StruParam::File },
                Some(b'R') => Command::Stru { structure: StruParam::Record },
                Some(b'P') => Command::Stru { structure: StruParam::Page },
                _ => return Err(ParseErrorKind::InvalidCommand.into()),
            }
        }
        "MODE" => {
            let params = parse_to_eol(cmd_params)?;
            if params.len() > 1 {
                return Err(ParseErrorKind::InvalidCommand.into());
            }
            match params.first() {
                Some(b'S') => Command::Mode { mode: ModeParam::Stream },
                Some(b'B') => Command::Mode { mode: ModeParam::Block },
                Some(b'C') => Command::Mode { mode: ModeParam::Compressed },
                _ => return Err(ParseErrorKind::InvalidCommand.into()),
            }
        }
        "HELP" => Command::Help,
        "NOOP" => {
            let params = parse_to_eol(cmd_params)?;
            if !params.is_empty() {
                // NOOP params are prohibited
                return Err(ParseErrorKind::InvalidCommand.into());
            }
            Command::Noop
        }
        "PASV" => {
            let params = parse_to_eol(cmd_params)?;
            if !params.is_empty() {
                return Err(ParseErrorKind::InvalidCommand.into());
            }
            Command::Pasv
        }
        "EPSV" => {
            // We accept and ignore the optional protocol parameter.
            let _ = parse_to_eol(cmd_params)?;
            Command::Epsv
        }
        "PORT" => {
            let params = parse_to_eol(cmd_params)?;
            if params.is_empty() {
                return Err(ParseErrorKind::InvalidCommand.into());
            }
            Command::Port {
                addr: String::from_utf8_lossy(&params).to_string(),
            }
        }
        "RETR" => {
            let path = parse_to_eol(cmd_params)?;
            if path.is_empty() {
                return Err(ParseErrorKind::InvalidCommand.into());
            }
            Command::Retr {
                path: String::from_utf8_lossy(&path).to_string(),
            }
        }
        "STOR" => {
            let path = parse_to_eol(cmd_params)?;
            if path.is_empty() {
                return Err(ParseErrorKind::InvalidCommand.into());
            }
            Command::Stor {
                path: String::from_utf8_lossy(&path).to_string(),
            }
        }
        "APPE" => {
            let path = parse_to_eol(cmd_params)?;
            if path.is_empty() {
                return Err(ParseErrorKind::InvalidCommand.into());
            }
            Command::Appe {
                path: String::from_utf8_lossy(&path).to_string(),
            }
        }
        "LIST" => {
            let line = parse_to_eol(cmd_params)?;
            let path = line
                .split(|&b| b == b' ')
                .filter(|s| !line.is_empty() && !s.starts_with(b"-"))
                .map(|s| String::from_utf8_lossy(s).to_string())
                .next();
            // Options like -la are thrown away.
            Command::List { options: None, path }
        }
        "NLST" => {
            let path = parse_to_eol(cmd_params)?;
            let path = if path.is_empty() {
                None
            } else {
                Some(String::from_utf8_lossy(&path).to_string())
            };
            Command::Nlst { path }
        }
        "MLSD" => {
            let path = parse_to_eol(cmd_params)?;
            let path = if path.is_empty() {
                None
            } else {
                Some(String::from_utf8_lossy(&path).to_string())
            };
            Command::Mlsd { path }
        }
        "MLST" => {
            let path = parse_to_eol(cmd_params)?;
            let path = if path.is_empty() {
                None
            } else {
                Some(String::from_utf8_lossy(&path).to_string())
            };
            Command::Mlst { path }
        }
        "FEAT" => {
            let params = parse_to_eol(cmd_params)?;
            if !params.is_empty() {
                return Err(ParseErrorKind::InvalidCommand.into());
            }
            Command::Feat
        }
        "OPTS" => {
            let params = parse_to_eol(cmd_params)?;
            if params.is_empty() {
                return Err(ParseErrorKind::InvalidCommand.into());
            }
            match &params[..] {
                b"UTF8 ON" => Command::Opts { option: Opt::Utf8 { on: true } },
                b"UTF8 OFF" => Command::Opts { option: Opt::Utf8 { on: false } },
                _ => return Err(ParseErrorKind::InvalidCommand.into()),
            }
        }
        "PWD" | "XPWD" => {
            let params = parse_to_eol(cmd_params)?;
            if !params.is_empty() {
                return Err(ParseErrorKind::InvalidCommand.into());
            }
            Command::Pwd
        }
        "CWD" | "XCWD" => {
            let path = parse_to_eol(cmd_params)?;
            if path.is_empty() {
                return Err(ParseErrorKind::InvalidCommand.into());
            }
            Command::Cwd {
                path: String::from_utf8_lossy(&path).to_string().into(),
            }
        }
        "CDUP" => {
            let params = parse_to_eol(cmd_params)?;
            if !params.is_empty() {
                return Err(ParseErrorKind::InvalidCommand.into());
            }
            Command::Cdup
        }
        "DELE" => {
            let path = parse_to_eol(cmd_params)?;
            if path.is_empty() {
                return Err(ParseErrorKind::InvalidCommand.into());
            }
            Command::Dele {
                path: String::from_utf8_lossy(&path).to_string(),
            }
        }
        "RMD" => {
            let path = parse_to_eol(cmd_params)?;
            if path.is_empty() {
                return Err(ParseErrorKind::InvalidCommand.into());
            }
            Command::Rmd {
                path: String::from_utf8_lossy(&path).to_string(),
            }
        }
        "QUIT" => {
            let params = parse_to_eol(cmd_params)?;
            if !params.is_empty() {
                return Err(ParseErrorKind::InvalidCommand.into());
            }
            Command::Quit
        }
        "MKD" | "XMKD" => {
            let params = parse_to_eol(cmd_params)?;
            if params.is_empty() {
                return Err(ParseErrorKind::InvalidCommand.into());
            }
            Command::Mkd {
                path: String::from_utf8_lossy(&params).to_string().into(),
            }
        }
        "ALLO" => Command::Allo,
        "ABOR" => {
            let params = parse_to_eol(cmd_params)?;
            if !params.is_empty() {
                return Err(ParseErrorKind::InvalidCommand.into());
            }
            Command::Abor
        }
        "RNFR" => {
            let params = parse_to_eol(cmd_params)?;
            if params.is_empty() {
                return Err(ParseErrorKind::InvalidCommand.into());
            }
            Command::Rnfr {
                file: String::from_utf8_lossy(&params).to_string().into(),
            }
        }
        "RNTO" => {
            let params = parse_to_eol(cmd_params)?;
            if params.is_empty() {
                return Err(ParseErrorKind::InvalidCommand.into());
            }
            Command::Rnto {
                file: String::from_utf8_lossy(&params).to_string().into(),
            }
        }
        "AUTH" => {
            let params = parse_to_eol(cmd_params)?;
            if params.len() > 3 {
                return Err(ParseErrorKind::InvalidCommand.into());
            }
            match str::from_utf8(&params)?.to_uppercase().as_str() {
                "TLS" => Command::Auth { protocol: AuthParam::Tls },
                "SSL" => Command::Auth { protocol: AuthParam::Ssl },
                _ => return Err(ParseErrorKind::InvalidCommand.into()),
            }
        }
        "SIZE" => {
            let params = parse_to_eol(cmd_params)?;
            if params.is_empty() {
                return Err(ParseErrorKind::InvalidCommand.into());
            }
            Command::Size {
                file: String::from_utf8_lossy(&params).to_string().into(),
            }
        }
        "REST" => {
            let params = parse_to_eol(cmd_params)?;
            if params.is_empty() {
                return Err(ParseErrorKind::InvalidCommand.into());
            }
            let offset = String::from_utf8_lossy(&params).to_string();
            match offset.parse::<u64>() {
                Ok(val) => Command::Rest { offset: val },
                Err(_) => return Err(ParseErrorKind::InvalidCommand.into()),
            }
        }
        "MDTM" => {
            let params = parse_to_eol(cmd_params)?;
            if params.is_empty() {
                return Err(ParseErrorKind::InvalidCommand.into());
            }
            Command::Mdtm {
                file: String::from_utf8_lossy(&params).to_string().into(),
            }
        }
        _ => {
            return Err(ParseErrorKind::UnknownCommand { command: cmd_token }.into());
        }
    };

    Ok(cmd)
}

/// Try to parse a buffer of bytes up to the end of line into a `Bytes`.
fn parse_to_eol<T: AsRef<[u8]> + Into<Bytes>>(bytes: T) -> Result<Bytes> {
    let mut pos: usize = 0;
    let mut bytes: Bytes = bytes.into();
    let mut iter = bytes.as_ref().iter();

    loop {
        let b = match iter.next() {
            Some(b) => b,
            None => return Err(ParseErrorKind::InvalidEol.into()),
        };

        if *b == b'\r' {
            match iter.next() {
                Some(b'\n') => return Ok(bytes.split_to(pos)),
                _ => return Err(ParseErrorKind::InvalidEol.into()),
            }
        }

        if *b == b'\n' {
            return Ok(bytes.split_to(pos));
        }

        if !is_valid_token_char(*b) {
            return Err(ParseErrorKind::InvalidToken { token: *b }.into());
        }

        // A `Bytes` can never be bigger than usize::MAX so no overflow here.
        pos += 1;
    }
}

fn normalize(token: &[u8]) -> Result<String> {
    Ok(str::from_utf8(token).map(|t| t.to_uppercase())?)
}

fn is_valid_token_char(b: u8) -> bool {
    b > 0x1F && b < 0x7F
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_user_cmd_crnl() {
        let input = "USER Dolores\r\n";
        assert_eq!(parse(input).unwrap(), Command::User { username: "Dolores".into() });
    }

    #[test]
    fn parse_user_lowercase() {
        let input = "user Dolores\r\n";
        assert_eq!(parse(input).unwrap(), Command::User { username: "Dolores".into() });
    }

    #[test]
    fn parse_user_nl_only() {
        // bare newlines are accepted
        let input = "USER Dolores\n";
        assert_eq!(parse(input).unwrap(), Command::User { username: "Dolores".into() });
    }

    #[test]
    fn parse_user_no_eol_fails() {
        let input = "USER Dolores";
        assert_eq!(*parse(input).unwrap_err().kind(), ParseErrorKind::InvalidEol);
    }

    #[test]
    fn parse_pass_redacted_payload() {
        let input = "PASS s3cr3t\r\n";
        assert_eq!(
            parse(input).unwrap(),
            Command::Pass {
                password: "s3cr3t".into()
            }
        );
    }

    #[test]
    fn parse_rest_offset() {
        assert_eq!(parse("REST 1024\r\n").unwrap(), Command::Rest { offset: 1024 });
        assert!(parse("REST fourty\r\n").is_err());
    }

    #[test]
    fn parse_pasv_rejects_params() {
        assert_eq!(parse("PASV\r\n").unwrap(), Command::Pasv);
        assert!(parse("PASV foo\r\n").is_err());
    }

    #[test]
    fn parse_list_strips_options() {
        assert_eq!(
            parse("LIST -la docs\r\n").unwrap(),
            Command::List {
                options: None,
                path: Some("docs".to_string())
            }
        );
        assert_eq!(parse("LIST\r\n").unwrap(), Command::List { options: None, path: None });
    }

    #[test]
    fn parse_appe() {
        assert_eq!(parse("APPE upload.bin\r\n").unwrap(), Command::Appe { path: "upload.bin".into() });
    }

    #[test]
    fn parse_mlsd_with_and_without_path() {
        assert_eq!(parse("MLSD\r\n").unwrap(), Command::Mlsd { path: None });
        assert_eq!(parse("MLSD docs\r\n").unwrap(), Command::Mlsd { path: Some("docs".into()) });
    }

    #[test]
    fn parse_unknown_command() {
        let err = parse("MOO\r\n").unwrap_err();
        assert_eq!(
            *err.kind(),
            ParseErrorKind::UnknownCommand { command: "MOO".to_string() }
        );
    }

    #[test]
    fn parse_opts_utf8_only() {
        assert_eq!(parse("OPTS UTF8 ON\r\n").unwrap(), Command::Opts { option: Opt::Utf8 { on: true } });
        assert_eq!(parse("OPTS UTF8 OFF\r\n").unwrap(), Command::Opts { option: Opt::Utf8 { on: false } });
        assert!(parse("OPTS MLST type\r\n").is_err());
    }

    #[test]
    fn parse_control_chars_rejected() {
        let err = parse(b"USER Dol\x01ores\r\n".as_slice()).unwrap_err();
        assert_eq!(*err.kind(), ParseErrorKind::InvalidToken { token: 0x01 });
    }
}
