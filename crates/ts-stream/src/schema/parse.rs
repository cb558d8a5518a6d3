//! Line grammar for `variables.txt` documents.

use crate::error::{Result, StreamError};

use super::field::RawRow;

/// Tree name assumed when a document has no `tree` header.
pub const DEFAULT_TREE: &str = "Events";

/// Which row grammar a schema document uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaFormat {
    /// `variables.txt`: `type branch field count [counter]`.
    Variables,
    /// Store listing (`ls()` output): `idx branch : type [max] [<- counter] [*]`.
    Listing,
}

impl SchemaFormat {
    /// Listings always carry an `Entries` header line; variables documents never do.
    pub fn detect(text: &str) -> Self {
        let is_listing =
            text.lines().any(|line| line.split_whitespace().next() == Some("Entries"));
        if is_listing {
            SchemaFormat::Listing
        } else {
            SchemaFormat::Variables
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Header,
    Body,
}

/// Split a `variables.txt` document into tree names and raw rows.
pub fn parse_variables(text: &str) -> Result<(Vec<String>, Vec<RawRow>)> {
    let mut trees = Vec::new();
    let mut rows = Vec::new();
    let mut state = State::Header;

    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if state == State::Header && !trees.is_empty() {
                state = State::Body;
            }
            continue;
        }
        if trimmed.starts_with('#') {
            continue;
        }
        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        if tokens[0].eq_ignore_ascii_case("tree") {
            if state == State::Body {
                return Err(StreamError::schema(line_no, "tree directive after the header"));
            }
            let name = tokens
                .get(1)
                .ok_or_else(|| StreamError::schema(line_no, "tree directive without a name"))?;
            trees.push((*name).to_string());
            continue;
        }
        state = State::Body;
        rows.push(parse_row(line_no, &tokens)?);
    }

    if trees.is_empty() {
        trees.push(DEFAULT_TREE.to_string());
    }
    Ok((trees, rows))
}

fn parse_row(line: usize, tokens: &[&str]) -> Result<RawRow> {
    let (type_name, branch_name, field_name, count, counter) = match tokens {
        [t, b, f, c] => (t, b, f, c, None),
        [t, b, f, c, n] => (t, b, f, c, Some(n)),
        _ => {
            return Err(StreamError::schema(
                line,
                format!("expected 4 or 5 fields, found {}: '{}'", tokens.len(), tokens.join(" ")),
            ));
        }
    };
    let count: i64 = count
        .parse()
        .map_err(|_| StreamError::schema(line, format!("max count '{count}' is not an integer")))?;
    Ok(RawRow {
        line,
        type_name: (*type_name).to_string(),
        branch_name: (*branch_name).to_string(),
        field_name: (*field_name).to_string(),
        count,
        counter_name: counter.map(|c| (*c).to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "Tree Events\tMon Oct  4 10:00:00 2010\nTree Friends\n\n\
        double\tHT\tHT 1\n\
        int\tnjet\tnjet 1\n\
        float\tJet.PT\tJet_PT 20 njet\n";

    #[test]
    fn header_and_rows() {
        let (trees, rows) = parse_variables(DOC).unwrap();
        assert_eq!(trees, vec!["Events", "Friends"]);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].counter_name.as_deref(), Some("njet"));
        assert_eq!(rows[2].line, 6);
    }

    #[test]
    fn missing_header_defaults_tree() {
        let (trees, rows) = parse_variables("double HT HT 1\n").unwrap();
        assert_eq!(trees, vec![DEFAULT_TREE]);
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn bad_tree_directive() {
        let err = parse_variables("tree\n\ndouble HT HT 1\n").unwrap_err();
        assert!(matches!(err, StreamError::Schema { line: 1, .. }));
    }

    #[test]
    fn bad_token_count() {
        let err = parse_variables("Tree T\n\ndouble HT\n").unwrap_err();
        assert!(matches!(err, StreamError::Schema { line: 3, .. }));
        let err = parse_variables("Tree T\n\ndouble HT HT 1 n extra\n").unwrap_err();
        assert!(matches!(err, StreamError::Schema { line: 3, .. }));
    }

    #[test]
    fn bad_count() {
        let err = parse_variables("Tree T\n\ndouble HT HT many\n").unwrap_err();
        assert!(matches!(err, StreamError::Schema { .. }));
    }

    #[test]
    fn format_detection() {
        assert_eq!(SchemaFormat::detect(DOC), SchemaFormat::Variables);
        assert_eq!(
            SchemaFormat::detect("Tree Events\nEntries 10\n   0 HT : double\n"),
            SchemaFormat::Listing
        );
    }
}
