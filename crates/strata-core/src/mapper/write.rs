use super::ObjectMapper;
use crate::{
    error::InternalError,
    generator::GenerateError,
    iterator::BoundedStatementIterator,
    value::{Row, Value},
};
use std::collections::BTreeMap;
use strata_schema::{ID_FIELD, definition::ObjectDefinition, timeuuid, types::FieldType};

impl ObjectMapper {
    // ------------------------------------------------------------------
    // Insert
    // ------------------------------------------------------------------

    /// Insert a new object and return its id. An `id` in `values` is used
    /// as given; otherwise a time-based id is generated.
    pub async fn insert(&self, object: &str, values: Row) -> Result<Value, InternalError> {
        self.insert_with(object, values, None, None).await
    }

    /// Insert with every written row expiring after `ttl_seconds`.
    pub async fn insert_with_ttl(
        &self,
        object: &str,
        values: Row,
        ttl_seconds: u32,
    ) -> Result<Value, InternalError> {
        self.insert_with(object, values, None, Some(ttl_seconds))
            .await
    }

    /// Insert with an id at the start of the given millisecond. Ids made
    /// this way collide within one millisecond.
    pub async fn insert_at(
        &self,
        object: &str,
        values: Row,
        unix_millis: i64,
    ) -> Result<Value, InternalError> {
        let def = self.definition(object)?;
        let id = match def.primary_key_type() {
            FieldType::Timeuuid => Value::Timeuuid(timeuuid::min_for_unix_millis(unix_millis)),
            FieldType::Uuid => Value::Uuid(timeuuid::min_for_unix_millis(unix_millis)),
            field_type => {
                return Err(GenerateError::InvalidId {
                    object: object.to_string(),
                    field_type,
                }
                .into());
            }
        };

        self.insert_with(object, values, Some(id), None).await
    }

    /// Insert objects of several types as one batch. Returns the ids in
    /// input order, type by type.
    pub async fn insert_batch_mixed(
        &self,
        objects: BTreeMap<String, Vec<Row>>,
    ) -> Result<Vec<Value>, InternalError> {
        let mut ids = Vec::new();
        let mut batch = Vec::new();

        for (object, rows) in objects {
            let def = self.definition(&object)?;
            for values in rows {
                let (id, values) = self.prepare_insert(&def, values, None)?;
                let statements = self.generator.make_insert(&def, &id, &values, None)?;
                batch.push(BoundedStatementIterator::from(statements));
                ids.push(id);
            }
        }

        tracing::debug!(objects = ids.len(), "inserting mixed batch");
        self.executor.execute_batch(batch).await?;

        Ok(ids)
    }

    async fn insert_with(
        &self,
        object: &str,
        values: Row,
        id: Option<Value>,
        ttl: Option<u32>,
    ) -> Result<Value, InternalError> {
        let def = self.definition(object)?;
        let (id, values) = self.prepare_insert(&def, values, id)?;

        tracing::debug!(object, id = %id.to_index_string(), "insert");
        let statements = self.generator.make_insert(&def, &id, &values, ttl)?;
        self.executor
            .execute_batch(vec![BoundedStatementIterator::from(statements)])
            .await?;

        Ok(id)
    }

    // split the id out of the values and coerce both
    fn prepare_insert(
        &self,
        def: &ObjectDefinition,
        mut values: Row,
        id: Option<Value>,
    ) -> Result<(Value, Row), InternalError> {
        let supplied = values.remove(ID_FIELD).filter(|v| !v.is_null());
        let id = match id.or(supplied) {
            Some(id) => self.generator.coerce_id(def, id)?,
            None => generate_id(def)?,
        };
        let values = self.generator.coerce_row(def, values)?;

        Ok((id, values))
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Rewrite the given fields of an existing object. Fails with a
    /// not-found error when the object is absent.
    pub async fn update(
        &self,
        object: &str,
        id: impl Into<Value>,
        mut values: Row,
    ) -> Result<Value, InternalError> {
        let def = self.definition(object)?;
        let id = self.generator.coerce_id(&def, id.into())?;
        values.remove(ID_FIELD);
        let values = self.generator.coerce_row(&def, values)?;

        let Some(old) = self.get_by_key(object, id.clone()).await? else {
            return Err(InternalError::object_not_found(object, id.to_index_string()));
        };

        tracing::debug!(object, id = %id.to_index_string(), fields = values.len(), "update");
        let statements = self.generator.make_update(&def, &id, &old, &values)?;
        self.executor
            .execute_batch(vec![BoundedStatementIterator::from(statements)])
            .await?;

        Ok(id)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete an object and its index rows. Deleting an absent object is a
    /// no-op.
    pub async fn delete(&self, object: &str, id: impl Into<Value>) -> Result<(), InternalError> {
        let def = self.definition(object)?;
        let id = self.generator.coerce_id(&def, id.into())?;

        let Some(row) = self.get_by_key(object, id.clone()).await? else {
            tracing::debug!(object, id = %id.to_index_string(), "delete of absent object");
            return Ok(());
        };

        let statements = self.generator.make_delete(&def, &id, &row);
        self.executor
            .execute_batch(vec![BoundedStatementIterator::from(statements)])
            .await
    }
}

fn generate_id(def: &ObjectDefinition) -> Result<Value, GenerateError> {
    match def.primary_key_type() {
        FieldType::Timeuuid => Ok(Value::Timeuuid(timeuuid::generate())),
        FieldType::Uuid => Ok(Value::Uuid(timeuuid::generate())),
        field_type => Err(GenerateError::InvalidId {
            object: def.name().to_string(),
            field_type,
        }),
    }
}
