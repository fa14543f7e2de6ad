use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::core::{DbError, Result};

/// A named substitution slot inside a dialect template, written `#NAME#`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    TableName,
    FieldNames,
    FieldName,
    FieldNameKey,
    FieldType,
    FieldOptions,
    KeyType,
    Size,
    CreatedField,
    ChangedField,
    Name,
    Unique,
    RefTable,
    RefField,
    OnUpdate,
    OnDelete,
    Values,
    Assignments,
    Top,
    Event,
    Body,
    Comment,
    Query,
    Fields,
}

impl Placeholder {
    pub fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "TABLENAME" => Self::TableName,
            "FIELDNAMES" => Self::FieldNames,
            "FIELDNAME" => Self::FieldName,
            "FIELDNAMEKEY" => Self::FieldNameKey,
            "FIELDTYPE" => Self::FieldType,
            "FIELDOPTIONS" => Self::FieldOptions,
            "KEYTYPE" => Self::KeyType,
            "SIZE" => Self::Size,
            "CREATEDFIELD" => Self::CreatedField,
            "CHANGEDFIELD" => Self::ChangedField,
            "NAME" => Self::Name,
            "UNIQUE" => Self::Unique,
            "REFTABLE" => Self::RefTable,
            "REFFIELD" => Self::RefField,
            "ONUPDATE" => Self::OnUpdate,
            "ONDELETE" => Self::OnDelete,
            "VALUES" => Self::Values,
            "ASSIGNMENTS" => Self::Assignments,
            "TOP" => Self::Top,
            "EVENT" => Self::Event,
            "BODY" => Self::Body,
            "COMMENT" => Self::Comment,
            "QUERY" => Self::Query,
            "FIELDS" => Self::Fields,
            _ => return None,
        })
    }

    pub fn token(&self) -> &'static str {
        match self {
            Self::TableName => "#TABLENAME#",
            Self::FieldNames => "#FIELDNAMES#",
            Self::FieldName => "#FIELDNAME#",
            Self::FieldNameKey => "#FIELDNAMEKEY#",
            Self::FieldType => "#FIELDTYPE#",
            Self::FieldOptions => "#FIELDOPTIONS#",
            Self::KeyType => "#KEYTYPE#",
            Self::Size => "#SIZE#",
            Self::CreatedField => "#CREATEDFIELD#",
            Self::ChangedField => "#CHANGEDFIELD#",
            Self::Name => "#NAME#",
            Self::Unique => "#UNIQUE#",
            Self::RefTable => "#REFTABLE#",
            Self::RefField => "#REFFIELD#",
            Self::OnUpdate => "#ONUPDATE#",
            Self::OnDelete => "#ONDELETE#",
            Self::Values => "#VALUES#",
            Self::Assignments => "#ASSIGNMENTS#",
            Self::Top => "#TOP#",
            Self::Event => "#EVENT#",
            Self::Body => "#BODY#",
            Self::Comment => "#COMMENT#",
            Self::Query => "#QUERY#",
            Self::Fields => "#FIELDS#",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Slot(Placeholder),
}

/// A parsed SQL template.
///
/// Parsing rejects unknown `#TOKEN#`s; rendering rejects slots without a
/// binding. Neither step ever leaves a raw token in the output.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlTemplate {
    segments: Vec<Segment>,
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"#([A-Z]+)#").expect("placeholder pattern is valid"))
}

impl SqlTemplate {
    pub fn parse(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut last = 0;

        for caps in token_pattern().captures_iter(source) {
            let Some(whole) = caps.get(0) else { continue };
            let placeholder = Placeholder::from_token(&caps[1]).ok_or_else(|| {
                DbError::Template(format!("Unknown placeholder '{}' in '{}'", whole.as_str(), source))
            })?;

            if whole.start() > last {
                segments.push(Segment::Text(source[last..whole.start()].to_string()));
            }
            segments.push(Segment::Slot(placeholder));
            last = whole.end();
        }

        if last < source.len() {
            segments.push(Segment::Text(source[last..].to_string()));
        }

        Ok(Self { segments })
    }

    pub fn contains(&self, placeholder: Placeholder) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Slot(p) if *p == placeholder))
    }

    pub fn placeholders(&self) -> Vec<Placeholder> {
        let mut found = Vec::new();
        for segment in &self.segments {
            if let Segment::Slot(p) = segment {
                if !found.contains(p) {
                    found.push(*p);
                }
            }
        }
        found
    }

    pub fn render(&self, bindings: &Bindings) -> Result<String> {
        let mut sql = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => sql.push_str(text),
                Segment::Slot(placeholder) => {
                    let value = bindings.get(*placeholder).ok_or_else(|| {
                        DbError::Template(format!("No value bound for {}", placeholder.token()))
                    })?;
                    sql.push_str(value);
                }
            }
        }
        Ok(sql)
    }
}

/// Placeholder values for one render.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: HashMap<Placeholder, String>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, placeholder: Placeholder, value: impl Into<String>) -> Self {
        self.values.insert(placeholder, value.into());
        self
    }

    pub fn set(&mut self, placeholder: Placeholder, value: impl Into<String>) {
        self.values.insert(placeholder, value.into());
    }

    pub fn get(&self, placeholder: Placeholder) -> Option<&str> {
        self.values.get(&placeholder).map(String::as_str)
    }
}

/// Quotes text as a SQL string literal.
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}
