use sea_query::{Expr, Order, Query, SqliteQueryBuilder};

use crate::schema::SuggestedTasks;

/// All columns in row-mapping order
fn all_columns() -> [SuggestedTasks; 10] {
    [
        SuggestedTasks::Id,
        SuggestedTasks::Title,
        SuggestedTasks::Description,
        SuggestedTasks::Service,
        SuggestedTasks::Action,
        SuggestedTasks::Params,
        SuggestedTasks::Status,
        SuggestedTasks::CreatedAt,
        SuggestedTasks::UpdatedAt,
        SuggestedTasks::SourceContext,
    ]
}

/// INSERT INTO suggested_tasks (id, title, description, service, action,
/// params, status, created_at, updated_at, source_context) VALUES (...)
#[allow(clippy::too_many_arguments)]
pub fn insert(
    id: &str,
    title: &str,
    description: &str,
    service: Option<&str>,
    action: Option<&str>,
    params: Option<&str>,
    status: &str,
    created_at: &str,
    source_context: Option<&str>,
) -> String {
    Query::insert()
        .into_table(SuggestedTasks::Table)
        .columns(all_columns())
        .values_panic([
            id.into(),
            title.into(),
            description.into(),
            service.into(),
            action.into(),
            params.into(),
            status.into(),
            created_at.into(),
            Option::<String>::None.into(),
            source_context.into(),
        ])
        .to_string(SqliteQueryBuilder)
}

/// SELECT <all columns> FROM suggested_tasks WHERE id = ?
pub fn select_by_id(id: &str) -> String {
    Query::select()
        .columns(all_columns())
        .from(SuggestedTasks::Table)
        .and_where(Expr::col(SuggestedTasks::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}

/// SELECT <all columns> FROM suggested_tasks [WHERE status = ?]
/// ORDER BY created_at DESC LIMIT ?
pub fn select_recent(status: Option<&str>, limit: u64) -> String {
    let mut query = Query::select()
        .columns(all_columns())
        .from(SuggestedTasks::Table)
        .order_by(SuggestedTasks::CreatedAt, Order::Desc)
        .limit(limit)
        .to_owned();
    if let Some(status) = status {
        query.and_where(Expr::col(SuggestedTasks::Status).eq(status));
    }
    query.to_string(SqliteQueryBuilder)
}

/// SELECT <all columns> FROM suggested_tasks
/// WHERE status IN ('pending', 'in_progress')
/// ORDER BY created_at DESC LIMIT ?
/// The bounded subset pushed to extension clients
pub fn select_recent_open(limit: u64) -> String {
    Query::select()
        .columns(all_columns())
        .from(SuggestedTasks::Table)
        .and_where(Expr::col(SuggestedTasks::Status).is_in(["pending", "in_progress"]))
        .order_by(SuggestedTasks::CreatedAt, Order::Desc)
        .limit(limit)
        .to_string(SqliteQueryBuilder)
}

/// UPDATE suggested_tasks SET status = ?, updated_at = ? WHERE id = ?
pub fn update_status(id: &str, status: &str, updated_at: &str) -> String {
    Query::update()
        .table(SuggestedTasks::Table)
        .values([
            (SuggestedTasks::Status, status.into()),
            (SuggestedTasks::UpdatedAt, updated_at.into()),
        ])
        .and_where(Expr::col(SuggestedTasks::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}

/// UPDATE suggested_tasks SET status = ?, updated_at = ?
/// WHERE id = ? AND status = ?
/// The status predicate makes the write a conditional claim: zero rows
/// affected means another writer moved the task first
pub fn update_status_from(id: &str, expected: &str, status: &str, updated_at: &str) -> String {
    Query::update()
        .table(SuggestedTasks::Table)
        .values([
            (SuggestedTasks::Status, status.into()),
            (SuggestedTasks::UpdatedAt, updated_at.into()),
        ])
        .and_where(Expr::col(SuggestedTasks::Id).eq(id))
        .and_where(Expr::col(SuggestedTasks::Status).eq(expected))
        .to_string(SqliteQueryBuilder)
}

/// DELETE FROM suggested_tasks WHERE id = ?
pub fn delete_by_id(id: &str) -> String {
    Query::delete()
        .from_table(SuggestedTasks::Table)
        .and_where(Expr::col(SuggestedTasks::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}
