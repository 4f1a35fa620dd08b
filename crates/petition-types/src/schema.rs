//! Request-shape validation.
//!
//! Every endpoint that accepts a JSON body (or a query object) names one of the
//! fragments in [`SCHEMAS`]. Checking a value against a fragment removes every
//! property the fragment does not declare, then applies the declared rules and
//! reports the first violation as a human-readable message.

use serde_json::{Map, Value};

use crate::models::{SortBy, parse_timestamp};

#[derive(Debug, Clone, Copy)]
pub enum FieldType {
    String { min_length: usize },
    Integer { minimum: i64 },
    Enum(&'static [&'static str]),
    DateTime,
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub ty: FieldType,
    pub required: bool,
}

#[derive(Debug)]
pub struct Schema {
    pub name: &'static str,
    pub fields: &'static [Field],
}

const fn string(name: &'static str, min_length: usize, required: bool) -> Field {
    Field {
        name,
        ty: FieldType::String { min_length },
        required,
    }
}

const fn integer(name: &'static str, required: bool) -> Field {
    Field {
        name,
        ty: FieldType::Integer { minimum: 0 },
        required,
    }
}

const fn date_time(name: &'static str) -> Field {
    Field {
        name,
        ty: FieldType::DateTime,
        required: false,
    }
}

pub const REGISTER_USER: &str = "User";
pub const LOGIN: &str = "LoginRequest";
pub const CHANGE_USER: &str = "ChangeUserDetails";
pub const POST_PETITION: &str = "PostPetition";
pub const PATCH_PETITION: &str = "PatchPetition";
pub const PETITION_SEARCH: &str = "PetitionSearchRequest";

pub static SCHEMAS: &[Schema] = &[
    Schema {
        name: REGISTER_USER,
        fields: &[
            string("name", 1, true),
            string("email", 1, true),
            string("password", 1, true),
            string("city", 0, false),
            string("country", 0, false),
        ],
    },
    Schema {
        name: LOGIN,
        fields: &[string("email", 1, true), string("password", 1, true)],
    },
    Schema {
        name: CHANGE_USER,
        fields: &[
            string("name", 1, false),
            string("email", 1, false),
            string("password", 1, false),
            string("currentPassword", 0, false),
            string("city", 0, false),
            string("country", 0, false),
        ],
    },
    Schema {
        name: POST_PETITION,
        fields: &[
            string("title", 1, true),
            string("description", 1, true),
            integer("categoryId", true),
            date_time("closingDate"),
        ],
    },
    Schema {
        name: PATCH_PETITION,
        fields: &[
            string("title", 1, false),
            string("description", 1, false),
            integer("categoryId", false),
            date_time("closingDate"),
        ],
    },
    Schema {
        name: PETITION_SEARCH,
        fields: &[
            string("q", 1, false),
            integer("categoryId", false),
            integer("authorId", false),
            Field {
                name: "sortBy",
                ty: FieldType::Enum(SortBy::ALL),
                required: false,
            },
            integer("count", false),
            integer("startIndex", false),
        ],
    },
];

pub fn lookup(name: &str) -> Result<&'static Schema, String> {
    SCHEMAS
        .iter()
        .find(|schema| schema.name == name)
        .ok_or_else(|| format!("can't resolve reference {}", name))
}

/// Validates `data` against the named fragment and returns the cleaned object.
///
/// With `require_not_empty`, an object left empty after stripping is rejected.
pub fn check_against_schema(
    name: &str,
    data: &Value,
    require_not_empty: bool,
) -> Result<Map<String, Value>, String> {
    lookup(name)?.check(data, require_not_empty)
}

impl Schema {
    pub fn check(
        &self,
        data: &Value,
        require_not_empty: bool,
    ) -> Result<Map<String, Value>, String> {
        let Value::Object(object) = data else {
            return Err("data should be object".to_string());
        };

        let cleaned: Map<String, Value> = object
            .iter()
            .filter(|(key, _)| self.fields.iter().any(|f| f.name == key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        for field in self.fields {
            match cleaned.get(field.name) {
                None if field.required => {
                    return Err(format!("data should have required property '{}'", field.name));
                }
                None => {}
                Some(value) => field.check(value)?,
            }
        }

        if require_not_empty && cleaned.is_empty() {
            return Err("no valid fields provided".to_string());
        }

        Ok(cleaned)
    }
}

impl Field {
    fn check(&self, value: &Value) -> Result<(), String> {
        let path = format!("data.{}", self.name);
        match self.ty {
            FieldType::String { min_length } => {
                let s = value.as_str().ok_or_else(|| format!("{} should be string", path))?;
                if s.chars().count() < min_length {
                    return Err(format!(
                        "{} should NOT be shorter than {} characters",
                        path, min_length
                    ));
                }
            }
            FieldType::Integer { minimum } => {
                let n = value.as_i64().ok_or_else(|| format!("{} should be integer", path))?;
                if n < minimum {
                    return Err(format!("{} should be >= {}", path, minimum));
                }
            }
            FieldType::Enum(allowed) => {
                let matches = value.as_str().is_some_and(|s| allowed.contains(&s));
                if !matches {
                    return Err(format!("{} should be equal to one of the allowed values", path));
                }
            }
            FieldType::DateTime => {
                let s = value.as_str().ok_or_else(|| format!("{} should be string", path))?;
                if parse_timestamp(s).is_none() {
                    return Err(format!("{} should match format \"date-time\"", path));
                }
            }
        }
        Ok(())
    }
}

/// Turns query-string values into JSON, reading integer-looking values as numbers.
/// Keys listed in `keep_as_string` are never converted.
pub fn unstringify<'a, I>(pairs: I, keep_as_string: &[&str]) -> Value
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let object = pairs
        .into_iter()
        .map(|(key, raw)| {
            let value = match raw.parse::<i64>() {
                Ok(n) if !keep_as_string.contains(&key.as_str()) => Value::from(n),
                _ => Value::String(raw.clone()),
            };
            (key.clone(), value)
        })
        .collect();
    Value::Object(object)
}
