use std::fmt;

use ::serde::{
    de::{self, MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};
use widestring::U16String;

use crate::pool::{PagedPool, Pool};
use crate::table::MessageTable;

impl<P: Pool> Serialize for MessageTable<P> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for entry in self.iter() {
            map.serialize_entry(&entry.id(), &entry.to_string_lossy())?;
        }
        map.end()
    }
}

struct MessageTableVisitor {}

impl MessageTableVisitor {
    fn new() -> Self {
        MessageTableVisitor {}
    }
}

impl<'de> Visitor<'de> for MessageTableVisitor {
    type Value = MessageTable<PagedPool>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of message identifiers to text")
    }

    fn visit_map<M>(self, mut access: M) -> Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        let mut table = MessageTable::new().map_err(<M::Error as de::Error>::custom)?;

        while let Some((id, text)) = access.next_entry::<u32, String>()? {
            table
                .insert_u16_str(id, &U16String::from_str(&text))
                .map_err(|e| <M::Error as de::Error>::custom(format!("message {id}: {e}")))?;
        }

        Ok(table)
    }
}

impl<'de> Deserialize<'de> for MessageTable<PagedPool> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(MessageTableVisitor::new())
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::entry::Encoding;
    use crate::error::{Error, Result};
    use crate::table::MessageTable;

    #[test]
    fn serialize_as_id_map() -> Result<()> {
        let mut table = MessageTable::new()?;
        table.insert_str(2, "second")?;
        table.insert_str(1, "first")?;

        let json = serde_json::to_string(&table).map_err(|e| Error::CustomError(e.to_string()))?;
        assert_eq!(json, r#"{"1":"first","2":"second"}"#);

        Ok(())
    }

    #[test]
    fn deserialize_into_wide_entries() -> Result<()> {
        let table: MessageTable = serde_json::from_str(r#"{"7":"seven","3":"three"}"#)
            .map_err(|e| Error::CustomError(e.to_string()))?;

        assert_eq!(table.ids().collect::<Vec<_>>(), vec![3, 7]);
        assert!(table.iter().all(|e| e.encoding() == Encoding::Wide));
        assert_eq!(
            table.get(7).map(|e| e.to_string_lossy()),
            Some("seven".to_string())
        );

        Ok(())
    }

    #[test]
    fn empty_text_fails_to_deserialize() {
        let result: serde_json::Result<MessageTable> = serde_json::from_str(r#"{"1":""}"#);
        assert!(result.is_err());
    }
}
