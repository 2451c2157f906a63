//! Dialect descriptors.
//!
//! The compiler never hardcodes quoting, placeholder syntax or operator
//! spelling; it asks a [`Dialect`]. [`DialectDescriptor`] is a data-driven
//! implementation with presets for PostgreSQL, MySQL, SQLite and plain ANSI
//! SQL. Callers construct one once and pass it by reference; nothing here is
//! global.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3;

use crate::ast::{BinaryOperator, JoinKind, SetOperator, SqlType};

/// Optional SQL features a dialect may or may not offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    Cte,
    Returning,
    Upsert,
    Window,
    Lateral,
    BulkCopy,
    Savepoint,
    AdvisoryLock,
}

impl Capability {
    pub const ALL: [Capability; 8] = [
        Capability::Cte,
        Capability::Returning,
        Capability::Upsert,
        Capability::Window,
        Capability::Lateral,
        Capability::BulkCopy,
        Capability::Savepoint,
        Capability::AdvisoryLock,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Capability::Cte => "CTE",
            Capability::Returning => "RETURNING",
            Capability::Upsert => "UPSERT",
            Capability::Window => "WINDOW",
            Capability::Lateral => "LATERAL",
            Capability::BulkCopy => "BULK_COPY",
            Capability::Savepoint => "SAVEPOINT",
            Capability::AdvisoryLock => "ADVISORY_LOCK",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStyle {
    /// `"ident"`
    DoubleQuote,
    /// `` `ident` ``
    Backtick,
    /// `[ident]`
    Bracket,
}

impl QuoteStyle {
    /// Quote `ident`, treating dots as schema separators.
    pub fn quote(&self, ident: &str) -> String {
        let (open, close) = match self {
            QuoteStyle::DoubleQuote => ('"', '"'),
            QuoteStyle::Backtick => ('`', '`'),
            QuoteStyle::Bracket => ('[', ']'),
        };
        let escaped_close = format!("{close}{close}");
        ident
            .split('.')
            .map(|part| {
                format!(
                    "{open}{}{close}",
                    part.replace(close, &escaped_close)
                )
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// Positional placeholder syntax, by 1-based ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderStyle {
    /// `$1, $2, ...`
    Dollar,
    /// `?` for every position.
    Question,
    /// `?1, ?2, ...`
    NumberedQuestion,
    /// `:1, :2, ...`
    Colon,
    /// `@p1, @p2, ...`
    AtP,
}

impl PlaceholderStyle {
    pub fn format(&self, ordinal: usize) -> String {
        match self {
            PlaceholderStyle::Dollar => format!("${ordinal}"),
            PlaceholderStyle::Question => "?".to_string(),
            PlaceholderStyle::NumberedQuestion => format!("?{ordinal}"),
            PlaceholderStyle::Colon => format!(":{ordinal}"),
            PlaceholderStyle::AtP => format!("@p{ordinal}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BooleanStyle {
    /// `TRUE` / `FALSE`
    Keyword,
    /// `1` / `0`
    Integer,
}

/// How a binary operator is spelled in a dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorSyntax {
    /// `(left OP right)`
    Infix(&'static str),
    /// `FUNC(left, right)`
    Function(&'static str),
    /// `(UPPER(left) OP UPPER(right))`: case-insensitive match emulation.
    UpperInfix(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpsertSyntax {
    /// `ON CONFLICT (target) DO UPDATE SET ... | DO NOTHING`
    OnConflict,
    /// `ON DUPLICATE KEY UPDATE ...`, `INSERT IGNORE` for do-nothing.
    OnDuplicateKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NullsOrdering {
    Native,
    /// Prepend an `(expr IS NULL)` sort key.
    EmulatedWithIsNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdvisoryLockSyntax {
    /// `pg_advisory_lock(key)` / `pg_advisory_unlock(key)`
    Postgres,
    /// `GET_LOCK(key, -1)` / `RELEASE_LOCK(key)`
    MySql,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BulkCopySyntax {
    /// `COPY table (cols) FROM STDIN`
    CopyFromStdin,
}

/// A target SQL dialect.
///
/// `name` plus `fingerprint` identify the dialect to the plan cache, which
/// never compares two dialects beyond that pair. Two dialects that render
/// anything differently must not share both.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &str;

    /// Hash of every setting that affects rendering, not just the name.
    fn fingerprint(&self) -> u64;

    fn quote_identifier(&self, ident: &str) -> String;

    /// Placeholder for the `ordinal`-th parameter, starting at 1.
    fn placeholder(&self, ordinal: usize) -> String;

    fn supports(&self, capability: Capability) -> bool;

    fn boolean_literal(&self, value: bool) -> &'static str;

    fn string_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// `None` means the operator has no rendering in this dialect.
    fn operator(&self, op: BinaryOperator) -> Option<OperatorSyntax>;

    /// Type name used in CAST; `None` when the dialect cannot cast to `ty`.
    fn type_name(&self, ty: &SqlType) -> Option<String>;

    fn supports_join(&self, _kind: JoinKind) -> bool {
        true
    }

    /// Whether `op ALL` is available (UNION ALL always is).
    fn supports_set_all(&self, _op: SetOperator) -> bool {
        true
    }

    fn nulls_ordering(&self) -> NullsOrdering {
        NullsOrdering::Native
    }

    /// Clause emitted before OFFSET when no LIMIT was given.
    fn offset_without_limit(&self) -> Option<&str> {
        None
    }

    fn upsert_syntax(&self) -> Option<UpsertSyntax> {
        None
    }

    fn advisory_lock_syntax(&self) -> Option<AdvisoryLockSyntax> {
        None
    }

    fn bulk_copy_syntax(&self) -> Option<BulkCopySyntax> {
        None
    }
}

/// Data-driven [`Dialect`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DialectDescriptor {
    name: String,
    quote: QuoteStyle,
    placeholder: PlaceholderStyle,
    booleans: BooleanStyle,
    backslash_escapes: bool,
    capabilities: BTreeSet<Capability>,
    operators: BTreeMap<BinaryOperator, OperatorSyntax>,
    types: BTreeMap<SqlType, String>,
    full_join: bool,
    set_all: bool,
    nulls: NullsOrdering,
    offset_without_limit: Option<String>,
    upsert: Option<UpsertSyntax>,
    advisory_lock: Option<AdvisoryLockSyntax>,
    bulk_copy: Option<BulkCopySyntax>,
}

fn standard_operators() -> BTreeMap<BinaryOperator, OperatorSyntax> {
    use BinaryOperator::*;
    use OperatorSyntax::Infix;

    BTreeMap::from([
        (Eq, Infix("=")),
        (NotEq, Infix("<>")),
        (Lt, Infix("<")),
        (LtEq, Infix("<=")),
        (Gt, Infix(">")),
        (GtEq, Infix(">=")),
        (And, Infix("AND")),
        (Or, Infix("OR")),
        (Plus, Infix("+")),
        (Minus, Infix("-")),
        (Multiply, Infix("*")),
        (Divide, Infix("/")),
        (Modulo, Infix("%")),
        (Like, Infix("LIKE")),
        (NotLike, Infix("NOT LIKE")),
        (ILike, OperatorSyntax::UpperInfix("LIKE")),
        (NotILike, OperatorSyntax::UpperInfix("NOT LIKE")),
        (Concat, Infix("||")),
    ])
}

fn type_table(entries: &[(SqlType, &str)]) -> BTreeMap<SqlType, String> {
    entries
        .iter()
        .map(|(ty, name)| (ty.clone(), name.to_string()))
        .collect()
}

impl DialectDescriptor {
    pub fn postgres() -> Self {
        let mut operators = standard_operators();
        operators.insert(BinaryOperator::ILike, OperatorSyntax::Infix("ILIKE"));
        operators.insert(BinaryOperator::NotILike, OperatorSyntax::Infix("NOT ILIKE"));
        operators.insert(BinaryOperator::RegexMatch, OperatorSyntax::Infix("~"));

        Self {
            name: "postgres".into(),
            quote: QuoteStyle::DoubleQuote,
            placeholder: PlaceholderStyle::Dollar,
            booleans: BooleanStyle::Keyword,
            backslash_escapes: false,
            capabilities: Capability::ALL.into_iter().collect(),
            operators,
            types: type_table(&[
                (SqlType::Boolean, "BOOLEAN"),
                (SqlType::Integer, "INTEGER"),
                (SqlType::BigInt, "BIGINT"),
                (SqlType::Real, "REAL"),
                (SqlType::Double, "DOUBLE PRECISION"),
                (SqlType::Text, "TEXT"),
                (SqlType::Bytes, "BYTEA"),
                (SqlType::Date, "DATE"),
                (SqlType::Timestamp, "TIMESTAMP"),
                (SqlType::Uuid, "UUID"),
                (SqlType::Json, "JSONB"),
            ]),
            full_join: true,
            set_all: true,
            nulls: NullsOrdering::Native,
            offset_without_limit: None,
            upsert: Some(UpsertSyntax::OnConflict),
            advisory_lock: Some(AdvisoryLockSyntax::Postgres),
            bulk_copy: Some(BulkCopySyntax::CopyFromStdin),
        }
    }

    pub fn mysql() -> Self {
        let mut operators = standard_operators();
        // `||` is logical OR unless PIPES_AS_CONCAT is set.
        operators.insert(BinaryOperator::Concat, OperatorSyntax::Function("CONCAT"));
        operators.insert(BinaryOperator::RegexMatch, OperatorSyntax::Infix("REGEXP"));

        Self {
            name: "mysql".into(),
            quote: QuoteStyle::Backtick,
            placeholder: PlaceholderStyle::Question,
            booleans: BooleanStyle::Integer,
            backslash_escapes: true,
            capabilities: BTreeSet::from([
                Capability::Cte,
                Capability::Upsert,
                Capability::Window,
                Capability::Lateral,
                Capability::Savepoint,
                Capability::AdvisoryLock,
            ]),
            operators,
            types: type_table(&[
                (SqlType::Integer, "SIGNED"),
                (SqlType::BigInt, "SIGNED"),
                (SqlType::Real, "FLOAT"),
                (SqlType::Double, "DOUBLE"),
                (SqlType::Text, "CHAR"),
                (SqlType::Bytes, "BINARY"),
                (SqlType::Date, "DATE"),
                (SqlType::Timestamp, "DATETIME"),
                (SqlType::Json, "JSON"),
            ]),
            full_join: false,
            set_all: true,
            nulls: NullsOrdering::EmulatedWithIsNull,
            offset_without_limit: Some("LIMIT 18446744073709551615".into()),
            upsert: Some(UpsertSyntax::OnDuplicateKey),
            advisory_lock: Some(AdvisoryLockSyntax::MySql),
            bulk_copy: None,
        }
    }

    pub fn sqlite() -> Self {
        Self {
            name: "sqlite".into(),
            quote: QuoteStyle::DoubleQuote,
            placeholder: PlaceholderStyle::Question,
            booleans: BooleanStyle::Integer,
            backslash_escapes: false,
            capabilities: BTreeSet::from([
                Capability::Cte,
                Capability::Returning,
                Capability::Upsert,
                Capability::Window,
                Capability::Savepoint,
            ]),
            operators: standard_operators(),
            types: type_table(&[
                (SqlType::Boolean, "INTEGER"),
                (SqlType::Integer, "INTEGER"),
                (SqlType::BigInt, "INTEGER"),
                (SqlType::Real, "REAL"),
                (SqlType::Double, "REAL"),
                (SqlType::Text, "TEXT"),
                (SqlType::Bytes, "BLOB"),
                (SqlType::Date, "TEXT"),
                (SqlType::Timestamp, "TEXT"),
                (SqlType::Uuid, "TEXT"),
                (SqlType::Json, "TEXT"),
            ]),
            full_join: true,
            set_all: false,
            nulls: NullsOrdering::Native,
            offset_without_limit: Some("LIMIT -1".into()),
            upsert: Some(UpsertSyntax::OnConflict),
            advisory_lock: None,
            bulk_copy: None,
        }
    }

    /// Plain standard SQL: no upsert, no RETURNING, no locking helpers.
    pub fn ansi() -> Self {
        Self {
            name: "ansi".into(),
            quote: QuoteStyle::DoubleQuote,
            placeholder: PlaceholderStyle::Question,
            booleans: BooleanStyle::Keyword,
            backslash_escapes: false,
            capabilities: BTreeSet::from([
                Capability::Cte,
                Capability::Window,
                Capability::Savepoint,
            ]),
            operators: standard_operators(),
            types: type_table(&[
                (SqlType::Boolean, "BOOLEAN"),
                (SqlType::Integer, "INTEGER"),
                (SqlType::BigInt, "BIGINT"),
                (SqlType::Real, "REAL"),
                (SqlType::Double, "DOUBLE PRECISION"),
                (SqlType::Text, "VARCHAR"),
                (SqlType::Bytes, "VARBINARY"),
                (SqlType::Date, "DATE"),
                (SqlType::Timestamp, "TIMESTAMP"),
            ]),
            full_join: true,
            set_all: true,
            nulls: NullsOrdering::Native,
            offset_without_limit: None,
            upsert: None,
            advisory_lock: None,
            bulk_copy: None,
        }
    }

    /// Look up a preset by name.
    pub fn preset(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::postgres()),
            "mysql" | "mariadb" => Some(Self::mysql()),
            "sqlite" => Some(Self::sqlite()),
            "ansi" => Some(Self::ansi()),
            _ => None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_quote(mut self, quote: QuoteStyle) -> Self {
        self.quote = quote;
        self
    }

    pub fn with_placeholder(mut self, placeholder: PlaceholderStyle) -> Self {
        self.placeholder = placeholder;
        self
    }

    pub fn with_booleans(mut self, booleans: BooleanStyle) -> Self {
        self.booleans = booleans;
        self
    }

    /// Replace the whole capability set.
    pub fn with_capabilities(mut self, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        self.capabilities = capabilities.into_iter().collect();
        self
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn without_capability(mut self, capability: Capability) -> Self {
        self.capabilities.remove(&capability);
        self
    }

    pub fn with_operator(mut self, op: BinaryOperator, syntax: OperatorSyntax) -> Self {
        self.operators.insert(op, syntax);
        self
    }

    pub fn without_operator(mut self, op: BinaryOperator) -> Self {
        self.operators.remove(&op);
        self
    }

    pub fn capabilities(&self) -> impl Iterator<Item = Capability> + '_ {
        self.capabilities.iter().copied()
    }
}

impl Dialect for DialectDescriptor {
    fn name(&self) -> &str {
        &self.name
    }

    fn fingerprint(&self) -> u64 {
        let mut hasher = Xxh3::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.quote.quote(ident)
    }

    fn placeholder(&self, ordinal: usize) -> String {
        self.placeholder.format(ordinal)
    }

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        match (self.booleans, value) {
            (BooleanStyle::Keyword, true) => "TRUE",
            (BooleanStyle::Keyword, false) => "FALSE",
            (BooleanStyle::Integer, true) => "1",
            (BooleanStyle::Integer, false) => "0",
        }
    }

    fn string_literal(&self, value: &str) -> String {
        let mut escaped = value.replace('\'', "''");
        if self.backslash_escapes {
            escaped = escaped.replace('\\', "\\\\");
        }
        format!("'{escaped}'")
    }

    fn operator(&self, op: BinaryOperator) -> Option<OperatorSyntax> {
        self.operators.get(&op).copied()
    }

    fn type_name(&self, ty: &SqlType) -> Option<String> {
        match ty {
            SqlType::Custom(name) => Some(name.clone()),
            other => self.types.get(other).cloned(),
        }
    }

    fn supports_join(&self, kind: JoinKind) -> bool {
        kind != JoinKind::Full || self.full_join
    }

    fn supports_set_all(&self, op: SetOperator) -> bool {
        op == SetOperator::Union || self.set_all
    }

    fn nulls_ordering(&self) -> NullsOrdering {
        self.nulls
    }

    fn offset_without_limit(&self) -> Option<&str> {
        self.offset_without_limit.as_deref()
    }

    fn upsert_syntax(&self) -> Option<UpsertSyntax> {
        self.upsert
    }

    fn advisory_lock_syntax(&self) -> Option<AdvisoryLockSyntax> {
        self.advisory_lock
    }

    fn bulk_copy_syntax(&self) -> Option<BulkCopySyntax> {
        self.bulk_copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoting_escapes_closing_char() {
        assert_eq!(QuoteStyle::DoubleQuote.quote("users"), "\"users\"");
        assert_eq!(QuoteStyle::DoubleQuote.quote("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(QuoteStyle::Backtick.quote("a`b"), "`a``b`");
        assert_eq!(QuoteStyle::Bracket.quote("x]y"), "[x]]y]");
        assert_eq!(QuoteStyle::DoubleQuote.quote("public.users"), "\"public\".\"users\"");
    }

    #[test]
    fn test_placeholder_styles() {
        assert_eq!(PlaceholderStyle::Dollar.format(3), "$3");
        assert_eq!(PlaceholderStyle::Question.format(3), "?");
        assert_eq!(PlaceholderStyle::NumberedQuestion.format(2), "?2");
        assert_eq!(PlaceholderStyle::Colon.format(1), ":1");
        assert_eq!(PlaceholderStyle::AtP.format(7), "@p7");
    }

    #[test]
    fn test_preset_capabilities() {
        let pg = DialectDescriptor::postgres();
        for cap in Capability::ALL {
            assert!(pg.supports(cap), "postgres should support {cap}");
        }
        let mysql = DialectDescriptor::mysql();
        assert!(!mysql.supports(Capability::Returning));
        assert!(mysql.supports(Capability::Upsert));
        let ansi = DialectDescriptor::ansi();
        assert!(!ansi.supports(Capability::Upsert));
        assert!(ansi.supports(Capability::Cte));
    }

    #[test]
    fn test_boolean_and_string_literals() {
        let pg = DialectDescriptor::postgres();
        let mysql = DialectDescriptor::mysql();
        assert_eq!(pg.boolean_literal(true), "TRUE");
        assert_eq!(mysql.boolean_literal(false), "0");
        assert_eq!(pg.string_literal("it's"), "'it''s'");
        assert_eq!(pg.string_literal("a\\b"), "'a\\b'");
        assert_eq!(mysql.string_literal("a\\b"), "'a\\\\b'");
    }

    #[test]
    fn test_operator_tables() {
        let pg = DialectDescriptor::postgres();
        let sqlite = DialectDescriptor::sqlite();
        assert_eq!(pg.operator(BinaryOperator::ILike), Some(OperatorSyntax::Infix("ILIKE")));
        assert_eq!(
            sqlite.operator(BinaryOperator::ILike),
            Some(OperatorSyntax::UpperInfix("LIKE"))
        );
        assert_eq!(sqlite.operator(BinaryOperator::RegexMatch), None);
        assert_eq!(
            DialectDescriptor::mysql().operator(BinaryOperator::Concat),
            Some(OperatorSyntax::Function("CONCAT"))
        );
    }

    #[test]
    fn test_type_names() {
        let mysql = DialectDescriptor::mysql();
        assert_eq!(mysql.type_name(&SqlType::Integer).as_deref(), Some("SIGNED"));
        assert_eq!(mysql.type_name(&SqlType::Boolean), None);
        assert_eq!(
            mysql.type_name(&SqlType::Custom("YEAR".into())).as_deref(),
            Some("YEAR")
        );
    }

    #[test]
    fn test_fingerprint_tracks_descriptor_contents() {
        let a = DialectDescriptor::postgres();
        let b = DialectDescriptor::postgres();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let c = DialectDescriptor::postgres().with_placeholder(PlaceholderStyle::Question);
        assert_eq!(c.name(), a.name());
        assert_ne!(c.fingerprint(), a.fingerprint());
    }

    #[test]
    fn test_preset_lookup() {
        assert_eq!(DialectDescriptor::preset("PostgreSQL"), Some(DialectDescriptor::postgres()));
        assert!(DialectDescriptor::preset("oracle").is_none());
    }
}
