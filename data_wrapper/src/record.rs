//! Record seam
//!
//! A [`Record`] tells the wrappers where it lives and how it is identified. Field
//! sets default to the record's serde representation, so a plain serde struct
//! only has to name its table:
//!
//! ```
//! use data_wrapper::Record;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! struct Item {
//!     id: Option<i64>,
//!     name: String,
//! }
//!
//! impl Record for Item {
//!     fn table_name(&self) -> &str {
//!         "items"
//!     }
//! }
//!
//! let item = Item { id: None, name: "lamp".into() };
//! assert!(item.id().is_none());
//! assert_eq!(item.store_data().len(), 1);
//! ```

use backend::Row;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    fn schema_name(&self) -> Option<&str> {
        None
    }

    fn table_name(&self) -> &str;

    /// Alias used in SELECT statements; identity lookups are qualified with it
    fn table_alias(&self) -> Option<&str> {
        None
    }

    /// Identity column, `None` when the record has no identity
    fn id_key(&self) -> Option<&str> {
        Some("id")
    }

    /// Identity value; `null` and empty strings count as missing
    fn id(&self) -> Option<Value> {
        let key = self.id_key()?;
        let value = self.to_map().remove(key)?;
        is_present(&value).then_some(value)
    }

    fn set_id(&mut self, id: Value) -> Result<(), serde_json::Error> {
        let Some(key) = self.id_key().map(str::to_string) else {
            return Ok(());
        };
        let mut map = self.to_map();
        map.insert(key, id);
        *self = serde_json::from_value(Value::Object(map))?;
        Ok(())
    }

    /// Columns written by an INSERT; the identity column is left to the backend
    fn store_data(&self) -> Map<String, Value> {
        let mut map = self.to_map();
        if let Some(key) = self.id_key() {
            map.shift_remove(key);
        }
        map
    }

    /// Columns written by an UPDATE
    fn update_data(&self) -> Map<String, Value> {
        self.store_data()
    }

    /// Statement head replacing `SELECT * FROM table`
    fn query_base(&self) -> Option<String> {
        None
    }

    fn from_row(row: Row) -> Result<Self, serde_json::Error> {
        row.decode()
    }

    #[doc(hidden)]
    fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

pub(crate) fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Identity key and value, when both are present
pub(crate) fn identity<R: Record>(record: &R) -> Option<(String, Value)> {
    let key = record.id_key().filter(|k| !k.is_empty())?;
    Some((key.to_string(), record.id()?))
}
