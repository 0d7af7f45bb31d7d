//! C8: row mapper — the compile-time reflection contract a target row type
//! must satisfy for the row-sink response handler (§4.7) to decode into it.
//!
//! Grounded on `nativepg/detail/row_traits.hpp` (`row_members<T>`,
//! `row_size_v<T>`, `row_name_table_v<T>`, `for_each_member`) for the
//! "ordered field names + per-field accessors" shape, realized here as two
//! traits a `#[derive(FromRow)]` macro (in the sibling `pgwire-derive`
//! crate) implements at compile time instead of Boost.Describe reflecting on
//! it at runtime. `ariaandika-postro/postro-macros/src/from_row.rs` supplies
//! the by-name matching idiom the generated `from_fields` body follows
//! (match each column's name against each target field in turn).

use crate::error::Result;
use crate::message::views::Cell;

/// What a generated [`FromRow::from_fields`] implementation pulls from, one
/// target field at a time, in declaration order.
///
/// An implementation (the row-sink handler, §4.7) has already resolved the
/// by-name position map and checked type compatibility by the time
/// `from_fields` runs, so `field` only fails if the derive macro and the
/// handler disagree about field names — a bug, not a runtime data error.
pub trait FieldSource<'a> {
    fn field(&mut self, name: &str) -> Result<(Cell<'a>, i32, i16)>;
}

/// Implemented by `#[derive(FromRow)]` for any named-field struct. Named
/// fields only — tuple and unit structs are out of scope (§4.8) since the
/// row-sink's position map is name-indexed.
pub trait FromRow: Sized {
    /// Declared field names, in declaration order.
    const FIELD_NAMES: &'static [&'static str];

    /// Whether the field at `index` (into [`FromRow::FIELD_NAMES`]) can be
    /// read from a column the server describes with `server_oid`, per C4's
    /// widening rules.
    fn field_is_compatible(index: usize, server_oid: i32) -> bool;

    /// Builds `Self` by pulling each declared field's raw bytes, OID and
    /// format out of `source`, in declaration order.
    fn from_fields<'a>(source: &mut dyn FieldSource<'a>) -> Result<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::FieldType;

    /// A hand-written stand-in for what `#[derive(FromRow)]` would generate
    /// for `struct Row { id: i32, name: String }`, exercising the trait
    /// shape without depending on the proc-macro crate from a unit test.
    struct Row {
        id: i32,
        name: String,
    }

    impl FromRow for Row {
        const FIELD_NAMES: &'static [&'static str] = &["id", "name"];

        fn field_is_compatible(index: usize, server_oid: i32) -> bool {
            match index {
                0 => i32::is_compatible(server_oid),
                1 => String::is_compatible(server_oid),
                _ => false,
            }
        }

        fn from_fields<'a>(source: &mut dyn FieldSource<'a>) -> Result<Self> {
            let (raw, oid, format) = source.field("id")?;
            let raw = raw.ok_or_else(|| Error::UnexpectedNull { field: "id".into() })?;
            let id = if format == 0 {
                i32::parse_text(oid, std::str::from_utf8(raw).unwrap())?
            } else {
                i32::parse_binary(oid, raw)?
            };

            let (raw, oid, format) = source.field("name")?;
            let raw = raw.ok_or_else(|| Error::UnexpectedNull { field: "name".into() })?;
            let name = if format == 0 {
                String::parse_text(oid, std::str::from_utf8(raw).unwrap())?
            } else {
                String::parse_binary(oid, raw)?
            };

            Ok(Row { id, name })
        }
    }

    struct FixedSource<'a> {
        id: Cell<'a>,
        name: Cell<'a>,
    }

    impl<'a> FieldSource<'a> for FixedSource<'a> {
        fn field(&mut self, name: &str) -> Result<(Cell<'a>, i32, i16)> {
            match name {
                "id" => Ok((self.id, 23, 0)),
                "name" => Ok((self.name, 25, 0)),
                other => panic!("unexpected field request: {other}"),
            }
        }
    }

    #[test]
    fn from_fields_builds_the_target_struct() {
        let mut source = FixedSource { id: Some(b"42"), name: Some(b"alice") };
        let row = Row::from_fields(&mut source).unwrap();
        assert_eq!(row.id, 42);
        assert_eq!(row.name, "alice");
    }

    #[test]
    fn field_is_compatible_rejects_foreign_oid_for_id() {
        assert!(!Row::field_is_compatible(0, crate::types::oid::TEXT));
        assert!(Row::field_is_compatible(0, crate::types::oid::INT4));
    }

    /// A target field declared `Option<i32>` admits a NULL cell instead of
    /// failing with `UnexpectedNull` (§4.7).
    struct Nullable {
        age: Option<i32>,
    }

    impl FromRow for Nullable {
        const FIELD_NAMES: &'static [&'static str] = &["age"];

        fn field_is_compatible(index: usize, server_oid: i32) -> bool {
            match index {
                0 => Option::<i32>::is_compatible(server_oid),
                _ => false,
            }
        }

        fn from_fields<'a>(source: &mut dyn FieldSource<'a>) -> Result<Self> {
            let (raw, oid, format) = source.field("age")?;
            let age = match raw {
                None => Option::<i32>::from_null()?,
                Some(raw) if format == 0 => {
                    Option::<i32>::parse_text(oid, std::str::from_utf8(raw).unwrap())?
                }
                Some(raw) => Option::<i32>::parse_binary(oid, raw)?,
            };
            Ok(Nullable { age })
        }
    }

    struct SingleFieldSource<'a> {
        value: Cell<'a>,
    }

    impl<'a> FieldSource<'a> for SingleFieldSource<'a> {
        fn field(&mut self, name: &str) -> Result<(Cell<'a>, i32, i16)> {
            match name {
                "age" => Ok((self.value, 23, 0)),
                other => panic!("unexpected field request: {other}"),
            }
        }
    }

    #[test]
    fn option_field_decodes_null_as_none() {
        let mut source = SingleFieldSource { value: None };
        let row = Nullable::from_fields(&mut source).unwrap();
        assert_eq!(row.age, None);
    }

    #[test]
    fn option_field_decodes_present_value_as_some() {
        let mut source = SingleFieldSource { value: Some(b"42") };
        let row = Nullable::from_fields(&mut source).unwrap();
        assert_eq!(row.age, Some(42));
    }
}
