use crate::host::Session;

/// Tables, views and their columns visible outside the system schemas, as one JSON array.
pub const SCHEMA_QUERY: &str = r#"
SELECT json_agg(row_to_json(schema_info))
FROM (
  SELECT t.table_name, t.table_type, t.table_schema,
         c.column_name, c.data_type
  FROM information_schema.tables t
  JOIN information_schema.columns c
    ON t.table_name = c.table_name AND t.table_schema = c.table_schema
  WHERE t.table_schema NOT IN ('pg_catalog', 'information_schema')
  ORDER BY t.table_schema, t.table_name, c.ordinal_position
) AS schema_info;
"#;

/// Schema summary for prompts; empty when it cannot be fetched.
pub fn fetch_schema(session: &mut dyn Session) -> String {
    match session.query_scalar(SCHEMA_QUERY) {
        Ok(schema) => schema.unwrap_or_default(),
        Err(err) => {
            tracing::warn!("could not read schema: {err}");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{SCHEMA_QUERY, fetch_schema};
    use crate::host::memory::MemorySession;

    #[test]
    fn schema_comes_from_the_session() {
        let mut session = MemorySession::new().with_scalar(SCHEMA_QUERY, "[]");
        assert_eq!(fetch_schema(&mut session), "[]");

        let mut empty = MemorySession::new();
        assert_eq!(fetch_schema(&mut empty), "");
        assert_eq!(empty.executed(), [SCHEMA_QUERY]);
    }
}
