pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.chars()
        .map(char::to_lowercase)
        .flatten()
        .eq(b.chars().map(char::to_lowercase).flatten())
}

pub fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t'
}

pub fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignore_case() {
        assert!(eq_ignore_case("LoadK", "loadk"));
        assert!(!eq_ignore_case("loadk", "loadkx"));
    }
}
