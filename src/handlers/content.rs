//! /admin content: image assets across both storage tables.

use axum::extract::{Query, State};
use axum::Extension;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::gate;
use crate::auth::rbac::Permission;
use crate::database::models::content::{ImageAsset, StorageUsage};
use crate::database::page::{Page, PageParams};
use crate::error::ApiError;
use crate::middleware::auth::StaffContext;
use crate::middleware::response::{ApiResponse, ApiResult};
use crate::state::AppState;

// page/limit stay inline: serde_urlencoded cannot flatten numeric fields.
#[derive(Debug, Deserialize)]
pub struct AssetQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    #[serde(rename = "type")]
    pub asset_type: Option<String>,
    pub user_id: Option<i32>,
}

impl AssetQuery {
    fn page_params(&self) -> PageParams {
        PageParams {
            page: self.page,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StorageQuery {
    pub group_by: Option<String>,
}

// Reference uploads and generated outputs live in separate tables; the
// dashboard lists them as one feed.
const ASSET_UNION: &str = "
    SELECT id, user_id, 'reference' AS asset_type, file_name, file_size,
           mime_type, width, height, gcp_url, thumbnail_url, created_at
    FROM reference_images
    UNION ALL
    SELECT id, user_id, 'generated' AS asset_type, file_name, file_size,
           mime_type, width, height, gcp_url, thumbnail_url, created_at
    FROM generated_images";

/// GET /admin/assets
pub async fn assets(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    Query(query): Query<AssetQuery>,
) -> ApiResult<Page<ImageAsset>> {
    gate::authorize(&ctx.roles, Permission::ContentView)?;

    if let Some(kind) = query.asset_type.as_deref() {
        if kind != "reference" && kind != "generated" {
            return Err(ApiError::validation_error(
                "type must be 'reference' or 'generated'",
            ));
        }
    }

    let page = query.page_params();
    let (_, limit) = page.clamped();

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM ({ASSET_UNION}) a
         WHERE ($1::text IS NULL OR a.asset_type = $1)
           AND ($2::int4 IS NULL OR a.user_id = $2)"
    ))
    .bind(&query.asset_type)
    .bind(query.user_id)
    .fetch_one(&state.pool)
    .await?;

    let items: Vec<ImageAsset> = sqlx::query_as(&format!(
        "SELECT * FROM ({ASSET_UNION}) a
         WHERE ($1::text IS NULL OR a.asset_type = $1)
           AND ($2::int4 IS NULL OR a.user_id = $2)
         ORDER BY a.created_at DESC NULLS LAST LIMIT $3 OFFSET $4"
    ))
    .bind(&query.asset_type)
    .bind(query.user_id)
    .bind(limit)
    .bind(page.offset())
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::success(Page::new(items, total, &page)))
}

/// GET /admin/storage/usage?group_by=user|project
pub async fn storage_usage(
    State(state): State<AppState>,
    Extension(ctx): Extension<StaffContext>,
    Query(query): Query<StorageQuery>,
) -> ApiResult<Value> {
    gate::authorize(&ctx.roles, Permission::ContentView)?;

    let group_by = query.group_by.as_deref().unwrap_or("user");

    let rows: Vec<StorageUsage> = match group_by {
        "user" => {
            sqlx::query_as(&format!(
                "SELECT a.user_id AS group_id,
                        COALESCE(SUM(a.file_size), 0)::int8 AS total_bytes,
                        COUNT(*) AS asset_count
                 FROM ({ASSET_UNION}) a
                 GROUP BY a.user_id ORDER BY total_bytes DESC LIMIT 100"
            ))
            .fetch_all(&state.pool)
            .await?
        }
        "project" => {
            // Only generated images carry a project linkage, through their job's session.
            sqlx::query_as(
                "SELECT p.id AS group_id,
                        COALESCE(SUM(gi.file_size), 0)::int8 AS total_bytes,
                        COUNT(*) AS asset_count
                 FROM generated_images gi
                 JOIN generation_jobs gj ON gj.id = gi.job_id
                 JOIN projects p ON p.id = gj.session_id
                 GROUP BY p.id ORDER BY total_bytes DESC LIMIT 100",
            )
            .fetch_all(&state.pool)
            .await?
        }
        _ => {
            return Err(ApiError::validation_error(
                "group_by must be 'user' or 'project'",
            ))
        }
    };

    let total_bytes: i64 = rows.iter().map(|r| r.total_bytes).sum();
    let total_assets: i64 = rows.iter().map(|r| r.asset_count).sum();

    Ok(ApiResponse::success(json!({
        "group_by": group_by,
        "total_bytes": total_bytes,
        "total_assets": total_assets,
        "groups": rows,
    })))
}
