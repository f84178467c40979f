// CREATE [PARTITION] PRIMARY | EXTENDED | LOGICAL [SIZE=<MB>] [ID=<hex>].
use std::io::Write;

use crate::core::engine::{CreateKind, CreateRequest};
use crate::core::error::Error;
use crate::shell::{Session, unquote};
use crate::shell::args::{invalid, option_value, parse_decimal_u64, parse_type_code};

pub(super) fn primary<W: Write>(session: &mut Session<W>, args: &[String]) -> Result<(), Error> {
    create(session, args, CreateKind::Primary)
}

pub(super) fn extended<W: Write>(session: &mut Session<W>, args: &[String]) -> Result<(), Error> {
    create(session, args, CreateKind::Extended)
}

pub(super) fn logical<W: Write>(session: &mut Session<W>, args: &[String]) -> Result<(), Error> {
    create(session, args, CreateKind::Logical)
}

fn create<W: Write>(
    session: &mut Session<W>,
    args: &[String],
    kind: CreateKind,
) -> Result<(), Error> {
    let request = parse_request(args, kind)?;
    let disk = session.selection.current_disk(&session.store)?.number;

    let created = session
        .engine
        .create_partition(&mut session.store, disk, request)?;
    session.selection.set_partition(created.id);
    session.say("DiskPart succeeded in creating the specified partition.")?;
    session.warn("create", created.commit.warning)
}

fn parse_request(args: &[String], kind: CreateKind) -> Result<CreateRequest, Error> {
    let first_option = match args.get(1) {
        Some(word) if word.eq_ignore_ascii_case("partition") => 3,
        _ => 2,
    };
    let mut request = CreateRequest {
        kind,
        size_mb: None,
        type_code: None,
    };
    for arg in args.iter().skip(first_option) {
        let arg = unquote(arg);
        if let Some(value) = option_value(&arg, "size=") {
            request.size_mb = Some(parse_decimal_u64(value, "size")?);
        } else if let Some(value) = option_value(&arg, "id=") {
            request.type_code = Some(parse_type_code(value)?);
        } else {
            return Err(invalid(format!("Unknown option: {arg}")));
        }
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::parse_request;
    use crate::core::engine::CreateKind;
    use crate::core::error::ErrorKind;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn options_follow_either_command_form() {
        let short = parse_request(&args("create primary size=100 id=7"), CreateKind::Primary)
            .expect("short form");
        let long = parse_request(
            &args("create partition primary SIZE=100 ID=07"),
            CreateKind::Primary,
        )
        .expect("long form");
        assert_eq!(short, long);
        assert_eq!(short.size_mb, Some(100));
        assert_eq!(short.type_code, Some(0x07));
    }

    #[test]
    fn quoted_options_are_unquoted() {
        let request = parse_request(
            &["create".to_string(), "primary".to_string(), "\"size=12\"".to_string()],
            CreateKind::Primary,
        )
        .expect("quoted");
        assert_eq!(request.size_mb, Some(12));
    }

    #[test]
    fn unknown_and_malformed_options_are_rejected() {
        let err = parse_request(&args("create primary align=64"), CreateKind::Primary)
            .expect_err("unknown");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.message(), Some("Unknown option: align=64"));

        let err = parse_request(&args("create logical size=big"), CreateKind::Logical)
            .expect_err("size");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
