//! Column catalog for the `child_assessment_features` table.
//!
//! Mirrors `sql/schema.sql`. Every patch is checked against this catalog
//! before it reaches a store, so a column name never flows unchecked into SQL.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

pub const TABLE: &str = "child_assessment_features";

/// Reactions captured by the auditory beep test.
pub const REACTION_SLOTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    Math,
    Reading,
    Writing,
    Auditory,
    Visual,
    Emotional,
}

impl ModuleKind {
    pub const DEFAULT_SEQUENCE: [ModuleKind; 6] = [
        ModuleKind::Math,
        ModuleKind::Reading,
        ModuleKind::Writing,
        ModuleKind::Auditory,
        ModuleKind::Visual,
        ModuleKind::Emotional,
    ];

    pub fn key(self) -> &'static str {
        match self {
            ModuleKind::Math => "math",
            ModuleKind::Reading => "reading",
            ModuleKind::Writing => "writing",
            ModuleKind::Auditory => "auditory",
            ModuleKind::Visual => "visual",
            ModuleKind::Emotional => "emotional",
        }
    }

    pub fn column_prefix(self) -> &'static str {
        match self {
            ModuleKind::Math => "test1",
            ModuleKind::Reading => "test2",
            ModuleKind::Writing => "test3",
            ModuleKind::Emotional => "test4",
            ModuleKind::Auditory => "test5",
            ModuleKind::Visual => "test6",
        }
    }

    pub fn question_count(self) -> usize {
        match self {
            ModuleKind::Math => 6,
            ModuleKind::Reading => 2,
            ModuleKind::Writing => 1,
            ModuleKind::Auditory => 3,
            ModuleKind::Visual => 4,
            ModuleKind::Emotional => 4,
        }
    }

    /// Object-storage folder for artifacts captured in this module.
    pub fn media_folder(self) -> &'static str {
        match self {
            ModuleKind::Reading => "audio",
            ModuleKind::Writing => "images",
            _ => "misc",
        }
    }

    /// Columns populated by the answer to `question` (zero-based).
    pub fn question_columns(self, question: usize) -> Option<QuestionColumns> {
        if question >= self.question_count() {
            return None;
        }
        let p = self.column_prefix();
        let n = question + 1;
        let cols = match self {
            ModuleKind::Math | ModuleKind::Emotional => QuestionColumns::Scored {
                score: format!("{p}_q{n}"),
                time: format!("{p}_q{n}_time"),
            },
            ModuleKind::Visual => QuestionColumns::Scored {
                score: format!("{p}_q{n}_score"),
                time: format!("{p}_q{n}_time"),
            },
            ModuleKind::Auditory if question == 0 => QuestionColumns::Reactions {
                slots: (1..=REACTION_SLOTS).map(|r| format!("{p}_q1_r{r}")).collect(),
            },
            ModuleKind::Auditory => QuestionColumns::Scored {
                score: format!("{p}_q{n}_score"),
                time: format!("{p}_q{n}_time"),
            },
            ModuleKind::Reading => QuestionColumns::Media {
                url: format!("{p}_audio{n}"),
            },
            ModuleKind::Writing => QuestionColumns::Media {
                url: format!("{p}_image"),
            },
        };
        Some(cols)
    }
}

impl std::fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// How one question's answer lands in the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionColumns {
    /// 0/1 (or numeric) score plus elapsed seconds.
    Scored { score: String, time: String },
    /// Public URL of an uploaded artifact.
    Media { url: String },
    /// Reaction times in milliseconds, one column per slot.
    Reactions { slots: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Uuid,
    Integer,
    Text,
    Timestamp,
}

impl ColumnKind {
    pub fn name(self) -> &'static str {
        match self {
            ColumnKind::Uuid => "uuid",
            ColumnKind::Integer => "integer",
            ColumnKind::Text => "text",
            ColumnKind::Timestamp => "timestamp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    /// Writable through `patch_session`.
    pub patchable: bool,
}

impl Column {
    fn new(name: impl Into<String>, kind: ColumnKind, patchable: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            patchable,
        }
    }
}

/// Every column of the session table, in schema order.
pub fn columns() -> &'static [Column] {
    static COLUMNS: OnceLock<Vec<Column>> = OnceLock::new();
    COLUMNS.get_or_init(|| {
        let mut cols = vec![
            Column::new("id", ColumnKind::Uuid, false),
            Column::new("child_name", ColumnKind::Text, true),
            Column::new("age", ColumnKind::Integer, true),
            Column::new("gender", ColumnKind::Text, true),
            Column::new("session_timestamp", ColumnKind::Timestamp, false),
            Column::new("completed_at", ColumnKind::Timestamp, false),
        ];
        for module in [
            ModuleKind::Math,
            ModuleKind::Reading,
            ModuleKind::Writing,
            ModuleKind::Emotional,
            ModuleKind::Auditory,
            ModuleKind::Visual,
        ] {
            for q in 0..module.question_count() {
                match module.question_columns(q) {
                    Some(QuestionColumns::Scored { score, time }) => {
                        cols.push(Column::new(score, ColumnKind::Integer, true));
                        cols.push(Column::new(time, ColumnKind::Integer, true));
                    }
                    Some(QuestionColumns::Media { url }) => {
                        cols.push(Column::new(url, ColumnKind::Text, true));
                    }
                    Some(QuestionColumns::Reactions { slots }) => {
                        for slot in slots {
                            cols.push(Column::new(slot, ColumnKind::Integer, true));
                        }
                    }
                    None => {}
                }
            }
        }
        cols.push(Column::new("video_link", ColumnKind::Text, true));
        cols.push(Column::new("report_url", ColumnKind::Text, true));
        cols
    })
}

pub fn column(name: &str) -> Option<&'static Column> {
    columns().iter().find(|c| c.name == name)
}
