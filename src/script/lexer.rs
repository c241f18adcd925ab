//! Tokenizer for the script subset accepted by the sandboxed compiler.
//!
//! Built from small `nom` combinators: each call to [`token`] consumes one
//! token from the front of the input, and [`tokenize`] drives it while
//! skipping whitespace and comments and tracking source positions.

use super::error::ScriptError;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit0, digit1, one_of, satisfy},
    combinator::{map, opt, recognize},
    sequence::{pair, preceded, tuple},
    IResult,
};
use phf::phf_map;

/// Reserved words recognized by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Break,
    Case,
    Catch,
    Const,
    Continue,
    Default,
    Do,
    Else,
    False,
    Finally,
    For,
    Function,
    If,
    In,
    Let,
    Null,
    Return,
    Switch,
    This,
    Throw,
    True,
    Try,
    Typeof,
    Var,
    While,
    // Reserved but unsupported; reported as syntax errors by the parser.
    Class,
    New,
    Delete,
    Instanceof,
    Yield,
    Await,
    Async,
    Import,
    Export,
    With,
}

static KEYWORDS: phf::Map<&'static str, Keyword> = phf_map! {
    "break" => Keyword::Break,
    "case" => Keyword::Case,
    "catch" => Keyword::Catch,
    "const" => Keyword::Const,
    "continue" => Keyword::Continue,
    "default" => Keyword::Default,
    "do" => Keyword::Do,
    "else" => Keyword::Else,
    "false" => Keyword::False,
    "finally" => Keyword::Finally,
    "for" => Keyword::For,
    "function" => Keyword::Function,
    "if" => Keyword::If,
    "in" => Keyword::In,
    "let" => Keyword::Let,
    "null" => Keyword::Null,
    "return" => Keyword::Return,
    "switch" => Keyword::Switch,
    "this" => Keyword::This,
    "throw" => Keyword::Throw,
    "true" => Keyword::True,
    "try" => Keyword::Try,
    "typeof" => Keyword::Typeof,
    "var" => Keyword::Var,
    "while" => Keyword::While,
    "class" => Keyword::Class,
    "new" => Keyword::New,
    "delete" => Keyword::Delete,
    "instanceof" => Keyword::Instanceof,
    "yield" => Keyword::Yield,
    "await" => Keyword::Await,
    "async" => Keyword::Async,
    "import" => Keyword::Import,
    "export" => Keyword::Export,
    "with" => Keyword::With,
};

/// A single lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Keyword(Keyword),
    Punct(&'static str),
    /// A backtick was seen; template literals are not part of the subset.
    Backtick,
    Eof,
}

/// A token plus where it started in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
    pub column: usize,
    /// A line terminator precedes this token (drives `return` ASI).
    pub newline_before: bool,
}

// Longest punctuators first so `alt` picks the maximal munch.
const PUNCTUATORS: &[&str] = &[
    ">>>=", "===", "!==", "**=", "...", ">>>", "<<=", ">>=", "=>", "==", "!=", "<=", ">=", "&&",
    "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "**", "<<",
    ">>", "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+", "-", "*", "/", "%", "!", "?",
    ":", "=", ".", "&", "|", "^", "~",
];

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn identifier(input: &str) -> IResult<&str, Token> {
    map(
        recognize(pair(satisfy(is_ident_start), take_while(is_ident_continue))),
        |word: &str| match KEYWORDS.get(word) {
            Some(keyword) => Token::Keyword(*keyword),
            None => Token::Ident(word.to_string()),
        },
    )(input)
}

fn radix_number(input: &str) -> IResult<&str, Token> {
    let (rest, (_, marker)) = pair(char('0'), one_of("xXbBoO"))(input)?;
    let radix = match marker {
        'x' | 'X' => 16,
        'b' | 'B' => 2,
        _ => 8,
    };
    let (rest, text) = take_while1(move |c: char| c.is_digit(radix))(rest)?;
    let value = text
        .chars()
        .fold(0f64, |acc, c| acc * radix as f64 + c.to_digit(radix).unwrap_or(0) as f64);
    Ok((rest, Token::Number(value)))
}

fn decimal_number(input: &str) -> IResult<&str, Token> {
    let exponent = tuple((one_of("eE"), opt(one_of("+-")), digit1));
    let mantissa = alt((
        recognize(tuple((digit1, opt(pair(char('.'), digit0))))),
        recognize(pair(char('.'), digit1)),
    ));
    let (rest, text) = recognize(pair(mantissa, opt(exponent)))(input)?;
    let value = text.parse::<f64>().map_err(|_| {
        nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Float))
    })?;
    Ok((rest, Token::Number(value)))
}

fn number(input: &str) -> IResult<&str, Token> {
    alt((radix_number, decimal_number))(input)
}

fn string_literal(input: &str) -> IResult<&str, Token> {
    let (mut rest, quote) = one_of("'\"")(input)?;
    let mut out = String::new();
    loop {
        let mut chars = rest.chars();
        let c = chars.next().ok_or_else(|| {
            nom::Err::Failure(nom::error::Error::new(rest, nom::error::ErrorKind::Char))
        })?;
        match c {
            c if c == quote => return Ok((chars.as_str(), Token::Str(out))),
            '\n' | '\r' => {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    rest,
                    nom::error::ErrorKind::Char,
                )))
            }
            '\\' => {
                let (after, decoded) = escape_sequence(chars.as_str())?;
                if let Some(ch) = decoded {
                    out.push(ch);
                }
                rest = after;
            }
            other => {
                out.push(other);
                rest = chars.as_str();
            }
        }
    }
}

fn escape_sequence(input: &str) -> IResult<&str, Option<char>> {
    let fail = || nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::Escaped));
    let mut chars = input.chars();
    let c = chars.next().ok_or_else(fail)?;
    let rest = chars.as_str();
    let simple = match c {
        'n' => Some('\n'),
        't' => Some('\t'),
        'r' => Some('\r'),
        'b' => Some('\u{8}'),
        'f' => Some('\u{c}'),
        'v' => Some('\u{b}'),
        '0' => Some('\0'),
        // Line continuation.
        '\n' => return Ok((rest, None)),
        'x' => {
            let hex = rest.get(..2).ok_or_else(fail)?;
            let code = u32::from_str_radix(hex, 16).map_err(|_| fail())?;
            return Ok((&rest[2..], char::from_u32(code)));
        }
        'u' => {
            if let Some(braced) = rest.strip_prefix('{') {
                let end = braced.find('}').ok_or_else(fail)?;
                let code = u32::from_str_radix(&braced[..end], 16).map_err(|_| fail())?;
                let ch = char::from_u32(code).ok_or_else(fail)?;
                return Ok((&braced[end + 1..], Some(ch)));
            }
            let hex = rest.get(..4).ok_or_else(fail)?;
            let code = u32::from_str_radix(hex, 16).map_err(|_| fail())?;
            return Ok((&rest[4..], Some(char::from_u32(code).unwrap_or('\u{fffd}'))));
        }
        other => Some(other),
    };
    Ok((rest, simple))
}

fn punctuator(input: &str) -> IResult<&str, Token> {
    for punct in PUNCTUATORS {
        if let Ok((rest, _)) = tag::<_, _, nom::error::Error<&str>>(*punct)(input) {
            // `a?.5:b` is a conditional, not optional chaining.
            if *punct == "?." && rest.starts_with(|c: char| c.is_ascii_digit()) {
                continue;
            }
            return Ok((rest, Token::Punct(punct)));
        }
    }
    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Tag,
    )))
}

/// Consume one token from the front of `input`.
pub fn token(input: &str) -> IResult<&str, Token> {
    alt((
        number,
        identifier,
        string_literal,
        map(char('`'), |_| Token::Backtick),
        punctuator,
    ))(input)
}

fn line_comment(input: &str) -> IResult<&str, &str> {
    recognize(preceded(tag("//"), take_while(|c| c != '\n')))(input)
}

fn block_comment(input: &str) -> IResult<&str, &str> {
    let (body, _) = tag("/*")(input)?;
    match body.find("*/") {
        Some(end) => Ok((&body[end + 2..], &input[..end + 4])),
        None => Err(nom::Err::Failure(nom::error::Error::new(
            input,
            nom::error::ErrorKind::TakeUntil,
        ))),
    }
}

fn trivia(input: &str) -> IResult<&str, &str> {
    alt((
        take_while1(|c: char| c.is_whitespace()),
        line_comment,
        block_comment,
    ))(input)
}

/// Line/column of the byte `offset` into `source`, both 1-based.
fn position(source: &str, offset: usize) -> (usize, usize) {
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let column = before
        .rfind('\n')
        .map(|nl| before[nl + 1..].chars().count())
        .unwrap_or_else(|| before.chars().count())
        + 1;
    (line, column)
}

/// Split `source` into tokens, always ending with [`Token::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ScriptError> {
    let mut tokens = Vec::new();
    let mut rest = source;
    let mut newline_before = false;

    loop {
        while let Ok((after, skipped)) = trivia(rest) {
            newline_before |= skipped.contains('\n');
            rest = after;
        }
        let offset = source.len() - rest.len();
        let (line, column) = position(source, offset);

        if rest.starts_with("/*") {
            return Err(ScriptError::syntax("Unterminated comment", line, column));
        }

        if rest.is_empty() {
            tokens.push(Spanned {
                token: Token::Eof,
                line,
                column,
                newline_before,
            });
            return Ok(tokens);
        }

        match token(rest) {
            Ok((after, token)) => {
                tokens.push(Spanned {
                    token,
                    line,
                    column,
                    newline_before,
                });
                newline_before = false;
                rest = after;
            }
            Err(_) => {
                let unexpected = rest.chars().next().unwrap_or(' ');
                let message = if rest.starts_with(['"', '\'']) {
                    "Invalid or unexpected token".to_string()
                } else {
                    format!("Invalid or unexpected token '{}'", unexpected)
                };
                return Err(ScriptError::syntax(message, line, column));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|spanned| spanned.token)
            .collect()
    }

    #[test]
    fn test_function_header() {
        assert_eq!(
            kinds("function add(a,b){return a+b}"),
            vec![
                Token::Keyword(Keyword::Function),
                Token::Ident("add".to_string()),
                Token::Punct("("),
                Token::Ident("a".to_string()),
                Token::Punct(","),
                Token::Ident("b".to_string()),
                Token::Punct(")"),
                Token::Punct("{"),
                Token::Keyword(Keyword::Return),
                Token::Ident("a".to_string()),
                Token::Punct("+"),
                Token::Ident("b".to_string()),
                Token::Punct("}"),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("0x1F")[0], Token::Number(31.0));
        assert_eq!(kinds("0b101")[0], Token::Number(5.0));
        assert_eq!(kinds("1.5e3")[0], Token::Number(1500.0));
        assert_eq!(kinds(".25")[0], Token::Number(0.25));
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#"'a\nb' "A\x42""#)[..2],
            [Token::Str("a\nb".to_string()), Token::Str("AB".to_string())]
        );
    }

    #[test]
    fn test_maximal_munch() {
        assert_eq!(
            kinds("a === b ?? c?.d")[1..6],
            [
                Token::Punct("==="),
                Token::Ident("b".to_string()),
                Token::Punct("??"),
                Token::Ident("c".to_string()),
                Token::Punct("?."),
            ]
        );
    }

    #[test]
    fn test_comments_and_newlines() {
        let tokens = tokenize("a // note\n/* block */ b").unwrap();
        assert_eq!(tokens[1].token, Token::Ident("b".to_string()));
        assert!(tokens[1].newline_before);
        assert_eq!(tokens[1].line, 2);
    }

    #[test]
    fn test_unterminated_string_is_syntax_error() {
        let err = tokenize("let s = 'oops").unwrap_err();
        assert!(matches!(err, ScriptError::Syntax { .. }));
    }
}
