//! `GET /docs/{page}` (SPEC_FULL.md §4.12, spec.md §6.3). No auth — help
//! pages carry no site content.

use axum::extract::Path;
use axum::response::Html;

use crate::docs;
use crate::error::AppResult;

pub async fn page(Path(page): Path<String>) -> AppResult<Html<String>> {
    docs::render(&page).map(Html)
}
