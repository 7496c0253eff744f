//! `PostgreSQL` repository for user-defined MCP servers.

use super::{
    models::{NewUserServerRow, UserServerRow},
    schema::mcp_user_servers,
};
use crate::tool_registry::{
    domain::{
        McpServerId, PersistedUserServerData, ServerConfig, ServerConfigDocument, ServerName,
        ServerStatus, ToolDescriptor, UserId, UserServerRecord,
    },
    ports::{
        UserServerFilter, UserServerRepository, UserServerRepositoryError,
        UserServerRepositoryResult,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};

/// `PostgreSQL` connection pool type for the user-server repository.
pub type UserServerPgPool = Pool<ConnectionManager<PgConnection>>;

const NAME_INDEX: &str = "idx_mcp_user_servers_user_name";

/// `PostgreSQL`-backed [`UserServerRepository`].
#[derive(Debug, Clone)]
pub struct PostgresUserServerRepository {
    pool: UserServerPgPool,
}

impl PostgresUserServerRepository {
    /// Creates a repository from a connection pool.
    #[must_use]
    pub const fn new(pool: UserServerPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, operation: F) -> UserServerRepositoryResult<T>
    where
        F: FnOnce(&mut PgConnection) -> UserServerRepositoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(UserServerRepositoryError::persistence)?;
            operation(&mut connection)
        })
        .await
        .map_err(UserServerRepositoryError::persistence)?
    }
}

#[async_trait]
impl UserServerRepository for PostgresUserServerRepository {
    async fn list(
        &self,
        filter: &UserServerFilter,
    ) -> UserServerRepositoryResult<Vec<UserServerRecord>> {
        let owned_filter = filter.clone();
        self.run_blocking(move |connection| {
            let mut query = mcp_user_servers::table
                .select(UserServerRow::as_select())
                .order((mcp_user_servers::user_id.asc(), mcp_user_servers::name.asc()))
                .into_boxed();
            if let Some(user_id) = owned_filter.user_id.as_ref() {
                query = query.filter(mcp_user_servers::user_id.eq(user_id.as_str().to_owned()));
            }
            if let Some(status) = owned_filter.status {
                query = query.filter(mcp_user_servers::status.eq(status.as_str()));
            }
            let rows = query
                .load::<UserServerRow>(connection)
                .map_err(UserServerRepositoryError::persistence)?;

            // Enabled flag and transport live inside the JSONB document.
            let mut records = Vec::with_capacity(rows.len());
            for row in rows {
                let record = row_to_record(row)?;
                if owned_filter.matches(&record) {
                    records.push(record);
                }
            }
            Ok(records)
        })
        .await
    }

    async fn get(
        &self,
        id: McpServerId,
        user_id: &UserId,
    ) -> UserServerRepositoryResult<Option<UserServerRecord>> {
        let owner = user_id.as_str().to_owned();
        self.run_blocking(move |connection| {
            let row = mcp_user_servers::table
                .filter(mcp_user_servers::id.eq(id.into_inner()))
                .filter(mcp_user_servers::user_id.eq(owner))
                .select(UserServerRow::as_select())
                .first::<UserServerRow>(connection)
                .optional()
                .map_err(UserServerRepositoryError::persistence)?;
            row.map(row_to_record).transpose()
        })
        .await
    }

    async fn create(&self, record: &UserServerRecord) -> UserServerRepositoryResult<()> {
        let new_row = to_new_row(record)?;
        let user_id = record.user_id().clone();
        let name = record.config().name().clone();

        self.run_blocking(move |connection| {
            diesel::insert_into(mcp_user_servers::table)
                .values(&new_row)
                .execute(connection)
                .map_err(|err| map_write_error(err, &user_id, &name))?;
            Ok(())
        })
        .await
    }

    async fn update(&self, record: &UserServerRecord) -> UserServerRepositoryResult<()> {
        let row = to_new_row(record)?;
        let user_id = record.user_id().clone();
        let name = record.config().name().clone();

        self.run_blocking(move |connection| {
            let updated = diesel::update(
                mcp_user_servers::table
                    .filter(mcp_user_servers::id.eq(row.id))
                    .filter(mcp_user_servers::user_id.eq(&row.user_id)),
            )
            .set((
                mcp_user_servers::name.eq(&row.name),
                mcp_user_servers::config.eq(&row.config),
                mcp_user_servers::status.eq(&row.status),
                mcp_user_servers::error_message.eq(&row.error_message),
                mcp_user_servers::tools.eq(&row.tools),
                mcp_user_servers::updated_at.eq(row.updated_at),
            ))
            .execute(connection)
            .map_err(|err| map_write_error(err, &user_id, &name))?;

            if updated == 0 {
                return Err(UserServerRepositoryError::NotFound(
                    McpServerId::from_uuid(row.id),
                ));
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: McpServerId, user_id: &UserId) -> UserServerRepositoryResult<()> {
        let owner = user_id.as_str().to_owned();
        self.run_blocking(move |connection| {
            let deleted = diesel::delete(
                mcp_user_servers::table
                    .filter(mcp_user_servers::id.eq(id.into_inner()))
                    .filter(mcp_user_servers::user_id.eq(owner)),
            )
            .execute(connection)
            .map_err(UserServerRepositoryError::persistence)?;
            if deleted == 0 {
                return Err(UserServerRepositoryError::NotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn set_tools(
        &self,
        id: McpServerId,
        tools: &[ToolDescriptor],
        at: DateTime<Utc>,
    ) -> UserServerRepositoryResult<()> {
        let serialized =
            serde_json::to_value(tools).map_err(UserServerRepositoryError::persistence)?;
        self.run_blocking(move |connection| {
            let target = mcp_user_servers::table.filter(mcp_user_servers::id.eq(id.into_inner()));
            let updated = diesel::update(target)
                .set((
                    mcp_user_servers::tools.eq(&serialized),
                    mcp_user_servers::updated_at.eq(at),
                ))
                .execute(connection)
                .map_err(UserServerRepositoryError::persistence)?;
            if updated == 0 {
                return Err(UserServerRepositoryError::NotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn set_status(
        &self,
        id: McpServerId,
        status: ServerStatus,
        error_message: Option<&str>,
        at: DateTime<Utc>,
    ) -> UserServerRepositoryResult<()> {
        let message = error_message.map(str::to_owned);
        self.run_blocking(move |connection| {
            let target = mcp_user_servers::table.filter(mcp_user_servers::id.eq(id.into_inner()));
            let updated = diesel::update(target)
                .set((
                    mcp_user_servers::status.eq(status.as_str()),
                    mcp_user_servers::error_message.eq(&message),
                    mcp_user_servers::updated_at.eq(at),
                ))
                .execute(connection)
                .map_err(UserServerRepositoryError::persistence)?;
            if updated == 0 {
                return Err(UserServerRepositoryError::NotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn toggle_enabled(
        &self,
        id: McpServerId,
        user_id: &UserId,
        enabled: bool,
        at: DateTime<Utc>,
    ) -> UserServerRepositoryResult<UserServerRecord> {
        let mut record = self
            .get(id, user_id)
            .await?
            .ok_or(UserServerRepositoryError::NotFound(id))?;
        record.set_enabled(enabled, at);
        self.update(&record).await?;
        Ok(record)
    }
}

fn map_write_error(
    err: DieselError,
    user_id: &UserId,
    name: &ServerName,
) -> UserServerRepositoryError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info)
            if info.constraint_name() == Some(NAME_INDEX) =>
        {
            UserServerRepositoryError::DuplicateServerName {
                user_id: user_id.clone(),
                name: name.clone(),
            }
        }
        other => UserServerRepositoryError::persistence(other),
    }
}

fn to_new_row(record: &UserServerRecord) -> UserServerRepositoryResult<NewUserServerRow> {
    let config = serde_json::to_value(record.config().to_document())
        .map_err(UserServerRepositoryError::persistence)?;
    let tools =
        serde_json::to_value(record.tools()).map_err(UserServerRepositoryError::persistence)?;
    Ok(NewUserServerRow {
        id: record.id().into_inner(),
        user_id: record.user_id().as_str().to_owned(),
        name: record.config().name().as_str().to_owned(),
        config,
        status: record.status().as_str().to_owned(),
        error_message: record.error_message().map(str::to_owned),
        tools,
        created_at: record.created_at(),
        updated_at: record.updated_at(),
    })
}

fn row_to_record(row: UserServerRow) -> UserServerRepositoryResult<UserServerRecord> {
    let UserServerRow {
        id,
        user_id,
        name,
        config,
        status,
        error_message,
        tools,
        created_at,
        updated_at,
    } = row;

    let parsed_user =
        UserId::new(user_id).map_err(UserServerRepositoryError::invalid_persisted_data)?;
    let parsed_name =
        ServerName::new(name).map_err(UserServerRepositoryError::invalid_persisted_data)?;
    let document: ServerConfigDocument = serde_json::from_value(config)
        .map_err(UserServerRepositoryError::invalid_persisted_data)?;
    let parsed_config = ServerConfig::from_document(parsed_name, document)
        .map_err(UserServerRepositoryError::invalid_persisted_data)?;
    let parsed_status = ServerStatus::try_from(status.as_str())
        .map_err(UserServerRepositoryError::invalid_persisted_data)?;
    let parsed_tools: Vec<ToolDescriptor> = serde_json::from_value(tools)
        .map_err(UserServerRepositoryError::invalid_persisted_data)?;

    Ok(UserServerRecord::from_persisted(PersistedUserServerData {
        id: McpServerId::from_uuid(id),
        user_id: parsed_user,
        config: parsed_config,
        status: parsed_status,
        error_message,
        tools: parsed_tools,
        created_at,
        updated_at,
    }))
}
