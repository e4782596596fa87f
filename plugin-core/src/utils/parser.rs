use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{alphanumeric1, char, multispace0, multispace1},
    combinator::{all_consuming, map, opt, recognize},
    error::ParseError,
    multi::many1,
    sequence::{delimited, pair, preceded, terminated, tuple},
    Finish, IResult,
};

pub fn with_target<'a, O, F: 'a, E: ParseError<&'a str>>(
    inner: F,
) -> impl FnMut(&'a str) -> IResult<&'a str, (O, Option<&'a str>), E>
where
    F: FnMut(&'a str) -> IResult<&'a str, O, E>,
{
    pair(inner, opt(target))
}

pub fn target<'a, E: ParseError<&'a str>>(input: &'a str) -> IResult<&'a str, &'a str, E> {
    let target_sep = delimited(multispace0, char('>'), multispace1);
    map(tuple((target_sep, word, multispace0)), |(_, n, _)| n)(input)
}

pub fn word<'a, E: ParseError<&'a str>>(input: &'a str) -> IResult<&'a str, &'a str, E> {
    recognize(many1(alphanumeric1))(input)
}

/// Account names as used by streaming platforms: letters, digits and underscores
pub fn handle<'a, E: ParseError<&'a str>>(input: &'a str) -> IResult<&'a str, &'a str, E> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_')(input)
}

/// Utility to parse common command prefix
pub fn command_prefix(input: &str) -> nom::IResult<&str, &str> {
    alt((tag("&"), tag("λ")))(input)
}

/// Parse a single command with an optional target
/// Returns None if the parser fails
pub fn single_command<'input>(
    cmd_name: &'static str,
    input: &'input str,
) -> Option<Option<&'input str>> {
    let cmd = preceded(
        command_prefix,
        map(with_target(tag(cmd_name)), |(_, t)| Some(t)),
    );

    all_consuming(terminated(cmd, multispace0))(input)
        .finish()
        .map(|x| x.1)
        .unwrap_or_default()
}

/// Parse a command taking at most one account name as argument.
/// Returns None if the input isn't this command,
/// Some(None) if the command is given without argument.
pub fn command_with_arg<'input>(
    cmd_name: &'static str,
    input: &'input str,
) -> Option<Option<&'input str>> {
    let arg = preceded(multispace1, handle);
    let cmd = preceded(command_prefix, preceded(tag(cmd_name), opt(arg)));

    all_consuming(terminated(cmd, multispace0))(input)
        .finish()
        .ok()
        .map(|x| x.1)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_single_command() {
        assert_eq!(
            single_command("coucou", "coucou"),
            None,
            "need the command prefix"
        );

        assert_eq!(
            single_command("coucou", "&other"),
            None,
            "only parses given word"
        );

        assert_eq!(
            single_command("coucou", "&coucou"),
            Some(None),
            "can parse single command"
        );

        assert_eq!(
            single_command("coucou", "λcoucou"),
            Some(None),
            "lambda prefix works too"
        );

        assert_eq!(
            single_command("coucou", "&other > charlie"),
            None,
            "target doesn't impact given word"
        );

        assert_eq!(
            single_command("coucou", "&coucou > charlie"),
            Some(Some("charlie")),
            "also parses with target"
        );
    }

    #[test]
    fn test_parse_command_with_arg() {
        assert_eq!(command_with_arg("sub", "sub nova"), None, "need the prefix");

        assert_eq!(
            command_with_arg("sub", "&sub nova_42"),
            Some(Some("nova_42")),
            "underscores are part of account names"
        );

        assert_eq!(
            command_with_arg("sub", "&sub   "),
            Some(None),
            "missing argument"
        );

        assert_eq!(
            command_with_arg("unsub", "&unsub_all"),
            None,
            "longer command names sharing a prefix don't match"
        );

        assert_eq!(
            command_with_arg("sub", "&subnova"),
            None,
            "argument must be separated"
        );

        assert_eq!(
            command_with_arg("sub", "&sub nova other"),
            None,
            "only one argument"
        );
    }
}
