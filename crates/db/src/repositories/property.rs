use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::debug;

use proptalk_core::domain::property::{
    AggregateGroup, Property, PropertyAggregate, PropertyFilter, PropertyId,
};
use proptalk_core::errors::CatalogError;
use proptalk_core::ports::PropertyCatalog;

use super::{parse_u32, parse_u64, to_i64, PropertyRepository, RepositoryError};
use crate::DbPool;

const PROPERTY_COLUMNS: &str =
    "id, transaction_type, location, property_type, bedrooms, price, building_name, size_sqft";

pub struct SqlPropertyRepository {
    pool: DbPool,
}

impl SqlPropertyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_properties(
        &self,
        filter: &PropertyFilter,
    ) -> Result<Vec<Property>, RepositoryError> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT {PROPERTY_COLUMNS} FROM property"));
        push_filter(&mut builder, filter);
        builder.push(" ORDER BY price ASC, id ASC");
        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ").push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(property_from_row).collect()
    }

    async fn fetch_aggregates(
        &self,
        filter: &PropertyFilter,
        group: AggregateGroup,
    ) -> Result<Vec<PropertyAggregate>, RepositoryError> {
        let bucket = match group {
            AggregateGroup::All => "'all'",
            AggregateGroup::Location => "location",
            AggregateGroup::PropertyType => "property_type",
            AggregateGroup::Bedrooms => "CAST(bedrooms AS TEXT)",
        };
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {bucket} AS bucket, COUNT(*) AS count, MIN(price) AS min_price, \
             MAX(price) AS max_price FROM property"
        ));
        push_filter(&mut builder, filter);
        if group != AggregateGroup::All {
            builder.push(" GROUP BY bucket ORDER BY count DESC, bucket ASC");
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(aggregate_from_row).collect()
    }
}

#[async_trait::async_trait]
impl PropertyCatalog for SqlPropertyRepository {
    async fn query_properties(
        &self,
        filter: &PropertyFilter,
    ) -> Result<Vec<Property>, CatalogError> {
        let properties = self.fetch_properties(filter).await?;
        debug!(
            event_name = "catalog.query_properties",
            rows = properties.len(),
            "property query completed"
        );
        Ok(properties)
    }

    async fn query_aggregates(
        &self,
        filter: &PropertyFilter,
        group: AggregateGroup,
    ) -> Result<Vec<PropertyAggregate>, CatalogError> {
        Ok(self.fetch_aggregates(filter, group).await?)
    }

    async fn find_property(&self, id: &PropertyId) -> Result<Option<Property>, CatalogError> {
        let row = sqlx::query(&format!("SELECT {PROPERTY_COLUMNS} FROM property WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        Ok(row.map(property_from_row).transpose()?)
    }
}

#[async_trait::async_trait]
impl PropertyRepository for SqlPropertyRepository {
    async fn save(&self, property: Property) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO property (
                id,
                transaction_type,
                location,
                property_type,
                bedrooms,
                price,
                building_name,
                size_sqft
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                transaction_type = excluded.transaction_type,
                location = excluded.location,
                property_type = excluded.property_type,
                bedrooms = excluded.bedrooms,
                price = excluded.price,
                building_name = excluded.building_name,
                size_sqft = excluded.size_sqft",
        )
        .bind(&property.id.0)
        .bind(property.transaction_type.as_str())
        .bind(&property.location)
        .bind(property.property_type.as_str())
        .bind(i64::from(property.bedrooms))
        .bind(to_i64(property.price))
        .bind(property.building_name.as_deref())
        .bind(property.size_sqft.map(i64::from))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM property")
            .fetch_one(&self.pool)
            .await?;
        parse_u64("count", count)
    }

    async fn clear(&self) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM property").execute(&self.pool).await?;
        Ok(())
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &PropertyFilter) {
    let mut separator = " WHERE ";
    let mut next = |builder: &mut QueryBuilder<'_, Sqlite>| {
        builder.push(separator);
        separator = " AND ";
    };

    if let Some(transaction_type) = filter.transaction_type {
        next(builder);
        builder.push("transaction_type = ").push_bind(transaction_type.as_str());
    }
    if let Some(location) = filter.location.as_deref() {
        next(builder);
        builder.push("location = ").push_bind(location.to_owned()).push(" COLLATE NOCASE");
    }
    if let Some(property_type) = filter.property_type {
        next(builder);
        builder.push("property_type = ").push_bind(property_type.as_str());
    }
    if let Some(bedrooms) = filter.bedrooms {
        next(builder);
        builder.push("bedrooms = ").push_bind(i64::from(bedrooms));
    }
    if let Some(price_min) = filter.price_min {
        next(builder);
        builder.push("price >= ").push_bind(to_i64(price_min));
    }
    if let Some(price_max) = filter.price_max {
        next(builder);
        builder.push("price <= ").push_bind(to_i64(price_max));
    }
}

fn property_from_row(row: SqliteRow) -> Result<Property, RepositoryError> {
    let transaction_raw = row.try_get::<String, _>("transaction_type")?;
    let transaction_type = transaction_raw
        .parse()
        .map_err(|_| RepositoryError::Decode(format!("unknown transaction type `{transaction_raw}`")))?;
    let type_raw = row.try_get::<String, _>("property_type")?;
    let property_type = type_raw
        .parse()
        .map_err(|_| RepositoryError::Decode(format!("unknown property type `{type_raw}`")))?;

    Ok(Property {
        id: PropertyId(row.try_get("id")?),
        transaction_type,
        location: row.try_get("location")?,
        property_type,
        bedrooms: parse_u32("bedrooms", row.try_get("bedrooms")?)?,
        price: parse_u64("price", row.try_get("price")?)?,
        building_name: row.try_get("building_name")?,
        size_sqft: row
            .try_get::<Option<i64>, _>("size_sqft")?
            .map(|value| parse_u32("size_sqft", value))
            .transpose()?,
    })
}

fn aggregate_from_row(row: SqliteRow) -> Result<PropertyAggregate, RepositoryError> {
    Ok(PropertyAggregate {
        bucket: row.try_get("bucket")?,
        count: parse_u64("count", row.try_get("count")?)?,
        min_price: row
            .try_get::<Option<i64>, _>("min_price")?
            .map(|value| parse_u64("min_price", value))
            .transpose()?,
        max_price: row
            .try_get::<Option<i64>, _>("max_price")?
            .map(|value| parse_u64("max_price", value))
            .transpose()?,
    })
}
