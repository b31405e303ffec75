//! Filter Engine: turns flat `field_op=value` query maps into typed
//! predicate trees that any store can evaluate or translate.

pub mod builder;
pub mod page;
pub mod predicate;
pub mod schema;
pub mod value;

pub use builder::{build_predicate, parse_key, RESERVED_KEYS};
pub use page::{Page, Pageable, Sort, SortDirection};
pub use predicate::{Condition, Filterable, Operand, Operator, Predicate};
pub use schema::{EntitySchema, FieldDescriptor, FieldType};
pub use value::FilterValue;
