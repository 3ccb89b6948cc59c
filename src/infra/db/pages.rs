use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{PagesRepo, PagesWriteRepo, RepoError, UpsertPageContentParams},
    domain::entities::PageContentRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct PageContentRow {
    id: Uuid,
    page_key: String,
    content: String,
    last_updated_by: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<PageContentRow> for PageContentRecord {
    fn from(row: PageContentRow) -> Self {
        Self {
            id: row.id,
            page_key: row.page_key,
            content: row.content,
            last_updated_by: row.last_updated_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl PagesRepo for PostgresRepositories {
    async fn find_page_content(
        &self,
        page_key: &str,
    ) -> Result<Option<PageContentRecord>, RepoError> {
        let row = sqlx::query_as::<_, PageContentRow>(
            "SELECT id, page_key, content, last_updated_by, created_at, updated_at \
             FROM page_contents WHERE page_key = $1",
        )
        .bind(page_key)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(PageContentRecord::from))
    }
}

#[async_trait]
impl PagesWriteRepo for PostgresRepositories {
    async fn upsert_page_content(
        &self,
        params: UpsertPageContentParams,
    ) -> Result<PageContentRecord, RepoError> {
        // `last_updated_by` keeps its previous value when no author is given.
        let row = sqlx::query_as::<_, PageContentRow>(
            "INSERT INTO page_contents (id, page_key, content, last_updated_by, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $5) \
             ON CONFLICT (page_key) DO UPDATE SET \
                content = EXCLUDED.content, \
                last_updated_by = COALESCE(EXCLUDED.last_updated_by, page_contents.last_updated_by), \
                updated_at = EXCLUDED.updated_at \
             RETURNING id, page_key, content, last_updated_by, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(&params.page_key)
        .bind(&params.content)
        .bind(params.updated_by.as_deref())
        .bind(OffsetDateTime::now_utc())
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(PageContentRecord::from(row))
    }
}
