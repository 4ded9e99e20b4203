use crate::{Error, Result, Statement};
use std::{
    collections::HashMap,
    fmt::{self, Display, Formatter},
};

/// Capabilities a backend may or may not support natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Upsert,
    Returning,
    Savepoints,
    Truncate,
    IndexIntrospection,
    SerialColumns,
}

impl Display for Feature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Feature::Upsert => "upsert",
            Feature::Returning => "RETURNING",
            Feature::Savepoints => "savepoints",
            Feature::Truncate => "TRUNCATE",
            Feature::IndexIntrospection => "index introspection",
            Feature::SerialColumns => "serial columns",
        })
    }
}

/// Positional parameter placeholder style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholders {
    /// Anonymous `?` markers.
    Anonymous,
    /// Numbered `$1`, `$2`, ... markers.
    Numbered,
}

/// Native conflict-handling syntax for insert-or-update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertSyntax {
    /// `ON CONFLICT (pk) DO UPDATE SET c = EXCLUDED.c`
    OnConflict,
    /// `ON DUPLICATE KEY UPDATE c = VALUES(c)`
    OnDuplicateKey,
    /// No native syntax, an emulation must be registered.
    Unsupported,
}

/// A statement rewrite standing in for a missing native capability.
pub type Emulation = fn(&Statement) -> Result<Statement>;

/// A SQL backend profile: feature flags plus syntax quirks, kept as plain
/// data rather than a trait hierarchy. Drivers pick one of the built-in
/// profiles or assemble their own.
#[derive(Debug, Clone)]
pub struct Dialect {
    name: &'static str,
    placeholders: Placeholders,
    quote: char,
    upsert: UpsertSyntax,
    features: &'static [Feature],
    /// Type names substituted for serial / bigserial columns.
    serial_types: (&'static str, &'static str),
    /// Keyword appended after PRIMARY KEY for auto-increment columns.
    auto_increment: &'static str,
    default_port: Option<u16>,
    emulations: HashMap<Feature, Emulation>,
}

impl Dialect {
    pub fn postgres() -> Self {
        Self {
            name: "postgres",
            placeholders: Placeholders::Numbered,
            quote: '"',
            upsert: UpsertSyntax::OnConflict,
            features: &[
                Feature::Upsert,
                Feature::Returning,
                Feature::Savepoints,
                Feature::Truncate,
                Feature::IndexIntrospection,
                Feature::SerialColumns,
            ],
            serial_types: ("SERIAL", "BIGSERIAL"),
            auto_increment: "",
            default_port: Some(5432),
            emulations: HashMap::new(),
        }
    }

    pub fn mysql() -> Self {
        Self {
            name: "mysql",
            placeholders: Placeholders::Anonymous,
            quote: '`',
            upsert: UpsertSyntax::OnDuplicateKey,
            features: &[
                Feature::Upsert,
                Feature::Savepoints,
                Feature::Truncate,
                Feature::IndexIntrospection,
                Feature::SerialColumns,
            ],
            serial_types: ("INTEGER", "BIGINT"),
            auto_increment: "AUTO_INCREMENT",
            default_port: Some(3306),
            emulations: HashMap::new(),
        }
    }

    /// SQLite has no TRUNCATE, the compiler falls back to an unfiltered
    /// DELETE for it.
    pub fn sqlite() -> Self {
        Self {
            name: "sqlite",
            placeholders: Placeholders::Anonymous,
            quote: '"',
            upsert: UpsertSyntax::OnConflict,
            features: &[
                Feature::Upsert,
                Feature::Savepoints,
                Feature::IndexIntrospection,
                Feature::SerialColumns,
            ],
            serial_types: ("INTEGER", "INTEGER"),
            auto_increment: "AUTOINCREMENT",
            default_port: None,
            emulations: HashMap::new(),
        }
    }

    /// Lowest common denominator profile used by tests and unknown backends.
    pub fn generic() -> Self {
        Self {
            name: "generic",
            placeholders: Placeholders::Anonymous,
            quote: '"',
            upsert: UpsertSyntax::Unsupported,
            features: &[Feature::Truncate],
            serial_types: ("INTEGER", "BIGINT"),
            auto_increment: "",
            default_port: None,
            emulations: HashMap::new(),
        }
    }

    pub fn for_name(name: &str) -> Option<Self> {
        match name {
            "postgres" | "postgresql" => Some(Self::postgres()),
            "mysql" | "mariadb" => Some(Self::mysql()),
            "sqlite" | "sqlite3" => Some(Self::sqlite()),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn supports(&self, feature: Feature) -> bool {
        if feature == Feature::Upsert {
            return self.upsert != UpsertSyntax::Unsupported;
        }
        self.features.contains(&feature)
    }

    pub fn upsert_syntax(&self) -> UpsertSyntax {
        self.upsert
    }

    /// Appends the placeholder for the 1-based parameter `index`. Numbering
    /// is globally monotonic within a single compiled statement.
    pub fn placeholder(&self, index: usize, out: &mut String) {
        match self.placeholders {
            Placeholders::Anonymous => out.push('?'),
            Placeholders::Numbered => {
                out.push('$');
                let mut buffer = itoa::Buffer::new();
                out.push_str(buffer.format(index));
            }
        }
    }

    /// Appends `name` quoted, doubling embedded quote characters.
    pub fn quote_identifier(&self, name: &str, out: &mut String) {
        out.push(self.quote);
        let mut position = 0;
        for (i, c) in name.char_indices() {
            if c == self.quote {
                out.push_str(&name[position..i]);
                out.push(self.quote);
                out.push(self.quote);
                position = i + 1;
            }
        }
        out.push_str(&name[position..]);
        out.push(self.quote);
    }

    /// Column type name for serial (`big` selects the 64 bit flavor).
    pub fn serial_type(&self, big: bool) -> &'static str {
        if big {
            self.serial_types.1
        } else {
            self.serial_types.0
        }
    }

    pub fn auto_increment_clause(&self) -> &'static str {
        self.auto_increment
    }

    pub fn default_port(&self) -> Option<u16> {
        self.default_port
    }

    /// Registers a statement rewrite substituting for a missing feature.
    pub fn register_emulation(&mut self, feature: Feature, emulation: Emulation) {
        self.emulations.insert(feature, emulation);
    }

    /// Rewrites `statement` through the registered emulation for `feature`,
    /// failing with [`Error::UnsupportedFeature`] when none exists. Callers
    /// must attempt this before giving up on a missing capability, the
    /// dialect never degrades silently.
    pub fn emulate(&self, feature: Feature, statement: &Statement) -> Result<Statement> {
        match self.emulations.get(&feature) {
            Some(emulation) => emulation(statement),
            None => Err(Error::UnsupportedFeature {
                feature,
                dialect: self.name,
            }),
        }
    }
}
