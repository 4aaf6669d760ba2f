use super::model::Constant;
use super::tokenize::{self, Cursor};
use crate::common::{self, is_blank};
use crate::isa::types::schema::OperandKinds;
use std::fmt::Display;

/// An operand as written, before it is bound to the function being assembled.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOperand {
    Stack(i64),
    Upvalue(i64),
    Location(String),
    Constant(Constant),
    /// A raw integer (or boolean) stored in the field as-is.
    Embedded(i64),
    Proto(String),
}

impl RawOperand {
    pub fn kind(&self) -> OperandKinds {
        match self {
            RawOperand::Stack(_) => OperandKinds::STACK,
            RawOperand::Upvalue(_) => OperandKinds::UPVALUE,
            RawOperand::Location(_) => OperandKinds::LOCATION,
            RawOperand::Constant(_) => OperandKinds::CONSTANT,
            RawOperand::Embedded(_) => OperandKinds::EMBEDDED,
            RawOperand::Proto(_) => OperandKinds::PROTO,
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum Error {
    Missing(OperandKinds),
    Illegal {
        found: OperandKinds,
        accepted: OperandKinds,
    },
    Lex(tokenize::Error),
    TooMany(String),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Missing(accepted) => write!(f, "missing operand, expected {}", accepted),
            Error::Illegal { found, accepted } => write!(
                f,
                "invalid operand: {} is not allowed here, expected {}",
                found, accepted
            ),
            Error::Lex(err) => write!(f, "invalid operand: {}", err),
            Error::TooMany(rest) => write!(f, "too many operands in instruction: '{}'", rest),
        }
    }
}

impl From<tokenize::Error> for Error {
    fn from(err: tokenize::Error) -> Self {
        Error::Lex(err)
    }
}

const STACK_SIGIL: char = '%';
const UPVALUE_SIGIL: char = '@';
const LOCATION_SIGIL: char = '$';
const CONST_KEYWORD: &str = "const";

fn permit(found: OperandKinds, accepted: OperandKinds) -> Result<(), Error> {
    if accepted.intersects(found) {
        Ok(())
    } else {
        Err(Error::Illegal { found, accepted })
    }
}

/// Parses the next operand from `cur`, accepting only the shapes in `accepted`. On failure
/// the cursor is left where it was.
pub fn parse(cur: &mut Cursor, accepted: OperandKinds) -> Result<RawOperand, Error> {
    let mut ahead = *cur;
    ahead.skip_blank();
    if ahead.at_end() {
        return Err(Error::Missing(accepted));
    }

    let operand = match ahead.peek() {
        Some(STACK_SIGIL) => {
            permit(OperandKinds::STACK, accepted)?;
            ahead.bump();
            RawOperand::Stack(ahead.integer()?)
        }
        Some(UPVALUE_SIGIL) => {
            permit(OperandKinds::UPVALUE, accepted)?;
            ahead.bump();
            RawOperand::Upvalue(ahead.integer()?)
        }
        Some(LOCATION_SIGIL) => {
            permit(OperandKinds::LOCATION, accepted)?;
            ahead.bump();
            RawOperand::Location(ahead.name()?.to_owned())
        }
        _ => bare(&mut ahead, accepted)?,
    };

    *cur = ahead;
    Ok(operand)
}

/// Operands without a sigil: `const <literal>`, subroutine names, and embedded values.
fn bare(cur: &mut Cursor, accepted: OperandKinds) -> Result<RawOperand, Error> {
    let mut keyword = *cur;
    if common::eq_ignore_case(keyword.word(), CONST_KEYWORD)
        && keyword.peek().map_or(false, is_blank)
    {
        permit(OperandKinds::CONSTANT, accepted)?;
        let constant = keyword.literal()?;
        *cur = keyword;
        return Ok(RawOperand::Constant(constant));
    }

    if accepted.contains(OperandKinds::PROTO) {
        return Ok(RawOperand::Proto(cur.name()?.to_owned()));
    }

    // A bare integer in a constant slot is taken as a raw pool index.
    if !accepted.intersects(OperandKinds::EMBEDDED | OperandKinds::CONSTANT) {
        return Err(Error::Illegal {
            found: OperandKinds::EMBEDDED,
            accepted,
        });
    }

    let mut word = *cur;
    let flag = word.word();
    let value = if common::eq_ignore_case(flag, "true") {
        *cur = word;
        1
    } else if common::eq_ignore_case(flag, "false") {
        *cur = word;
        0
    } else {
        cur.integer()?
    };

    if !cur.at_end() && !cur.rest().starts_with(is_blank) {
        return Err(tokenize::Error::TrailingCharacters(cur.rest().to_owned()).into());
    }

    Ok(RawOperand::Embedded(value))
}

/// Fails unless only blanks and a comment remain after the last operand. Returns the comment.
pub fn expect_no_more<'a>(cur: &mut Cursor<'a>) -> Result<Option<&'a str>, Error> {
    cur.expect_end().map_err(|err| match err {
        tokenize::Error::TrailingCharacters(rest) => Error::TooMany(rest),
        other => Error::Lex(other),
    })
}
