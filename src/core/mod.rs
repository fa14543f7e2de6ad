pub mod error;
pub mod types;
pub mod value;

pub use error::{DbError, Result};
pub use types::{DataType, FromValue, Row, parse_datetime};
pub use value::{DATETIME_FORMAT, Value};
