//! `virtual_models` and `virtual_model_backends`.

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;
use weir_core::domain::{VirtualModel, VirtualModelBackend};
use weir_core::ports::VirtualModelRepository;
use weir_core::{RequestContext, Result, WeirError};

use crate::SqliteStore;
use crate::codec::parsed;
use crate::error::{SqlResultExt, StoreError, expect_changed};

const VM_COLUMNS: &str = "
    SELECT id, created_at, updated_at, project_id, name, description, gateway_route_name, status
    FROM virtual_models";

const BACKEND_COLUMNS: &str = "
    SELECT b.id, b.created_at, b.updated_at, b.virtual_model_id, b.backend_name,
           b.backend_namespace, b.model_name_override, b.weight, b.priority, b.status
    FROM virtual_model_backends b
    JOIN virtual_models vm ON vm.id = b.virtual_model_id";

/// Preferred backends first: priority, then heavier weight, then age.
const BACKEND_ORDER: &str = "ORDER BY b.priority, b.weight DESC, b.created_at";

fn vm_from_row(row: &Row<'_>) -> rusqlite::Result<VirtualModel> {
    Ok(VirtualModel {
        id: row.get(0)?,
        created_at: row.get(1)?,
        updated_at: row.get(2)?,
        project_id: row.get(3)?,
        name: row.get(4)?,
        description: row.get(5)?,
        gateway_route_name: row.get(6)?,
        status: parsed(row, 7)?,
        backends: Vec::new(),
    })
}

fn backend_from_row(row: &Row<'_>) -> rusqlite::Result<VirtualModelBackend> {
    Ok(VirtualModelBackend {
        id: row.get(0)?,
        created_at: row.get(1)?,
        updated_at: row.get(2)?,
        virtual_model_id: row.get(3)?,
        backend_name: row.get(4)?,
        backend_namespace: row.get(5)?,
        model_name_override: row.get(6)?,
        weight: row.get(7)?,
        priority: row.get(8)?,
        status: parsed(row, 9)?,
    })
}

fn backends_of(conn: &Connection, vm_id: Uuid) -> Result<Vec<VirtualModelBackend>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "{BACKEND_COLUMNS} WHERE b.virtual_model_id = ?1 {BACKEND_ORDER}"
    ))?;
    let backends = stmt
        .query_map(params![vm_id], backend_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(backends)
}

/// Load one virtual model matching `predicate` (bound to ?1 and the
/// project at ?2) with its backends.
fn load_vm(
    conn: &Connection,
    predicate: &str,
    key: &dyn rusqlite::ToSql,
    project: Uuid,
) -> Result<VirtualModel, StoreError> {
    let mut vm = conn
        .query_row(
            &format!("{VM_COLUMNS} WHERE {predicate} AND project_id = ?2"),
            params![key, project],
            vm_from_row,
        )
        .optional()?
        .ok_or(StoreError::Domain(WeirError::VirtualModelNotFound))?;
    vm.backends = backends_of(conn, vm.id)?;
    Ok(vm)
}

fn vm_in_project(conn: &Connection, vm_id: Uuid, project: Uuid) -> Result<bool, StoreError> {
    Ok(conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM virtual_models WHERE id = ?1 AND project_id = ?2)",
        params![vm_id, project],
        |row| row.get(0),
    )?)
}

#[async_trait]
impl VirtualModelRepository for SqliteStore {
    async fn create(&self, ctx: &RequestContext, vm: &VirtualModel) -> Result<()> {
        let vm = vm.clone();
        self.call(ctx, move |conn| {
            conn.execute(
                "INSERT INTO virtual_models
                     (id, project_id, name, description, gateway_route_name, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    vm.id,
                    vm.project_id,
                    vm.name,
                    vm.description,
                    vm.gateway_route_name,
                    vm.status.as_str(),
                    vm.created_at,
                    vm.updated_at,
                ],
            )
            .on_conflict(WeirError::VirtualModelExists)?;
            Ok(())
        })
        .await
    }

    async fn get_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<VirtualModel> {
        let project = ctx.project_id();
        self.call(ctx, move |conn| load_vm(conn, "id = ?1", &id, project))
            .await
    }

    async fn get_by_name(&self, ctx: &RequestContext, name: &str) -> Result<VirtualModel> {
        let project = ctx.project_id();
        let name = name.to_string();
        self.call(ctx, move |conn| load_vm(conn, "name = ?1", &name, project))
            .await
    }

    async fn update(&self, ctx: &RequestContext, vm: &VirtualModel) -> Result<()> {
        let project = ctx.project_id();
        let vm = vm.clone();
        self.call(ctx, move |conn| {
            let changed = conn
                .execute(
                    "UPDATE virtual_models
                     SET name = ?1, description = ?2, gateway_route_name = ?3, status = ?4,
                         updated_at = ?5
                     WHERE id = ?6 AND project_id = ?7",
                    params![
                        vm.name,
                        vm.description,
                        vm.gateway_route_name,
                        vm.status.as_str(),
                        vm.updated_at,
                        vm.id,
                        project,
                    ],
                )
                .on_conflict(WeirError::VirtualModelExists)?;
            expect_changed(changed, WeirError::VirtualModelNotFound)
        })
        .await
    }

    async fn delete(&self, ctx: &RequestContext, id: Uuid) -> Result<()> {
        let project = ctx.project_id();
        self.call(ctx, move |conn| {
            let tx = conn.transaction()?;
            if !vm_in_project(&tx, id, project)? {
                return Err(WeirError::VirtualModelNotFound.into());
            }
            let backends = tx.execute(
                "DELETE FROM virtual_model_backends WHERE virtual_model_id = ?1",
                params![id],
            )?;
            tx.execute("DELETE FROM virtual_models WHERE id = ?1", params![id])?;
            tx.commit()?;
            tracing::debug!(virtual_model_id = %id, backends, "Deleted virtual model rows");
            Ok(())
        })
        .await
    }

    async fn list(&self, ctx: &RequestContext) -> Result<Vec<VirtualModel>> {
        let project = ctx.project_id();
        self.call(ctx, move |conn| {
            let mut stmt = conn.prepare(&format!("{VM_COLUMNS} WHERE project_id = ?1 ORDER BY name"))?;
            let mut vms = stmt
                .query_map(params![project], vm_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for vm in &mut vms {
                vm.backends = backends_of(conn, vm.id)?;
            }
            Ok(vms)
        })
        .await
    }

    async fn create_backend(&self, ctx: &RequestContext, backend: &VirtualModelBackend) -> Result<()> {
        let project = ctx.project_id();
        let backend = backend.clone();
        self.call(ctx, move |conn| {
            let tx = conn.transaction()?;
            if !vm_in_project(&tx, backend.virtual_model_id, project)? {
                return Err(WeirError::VirtualModelNotFound.into());
            }
            tx.execute(
                "INSERT INTO virtual_model_backends
                     (id, virtual_model_id, backend_name, backend_namespace, model_name_override,
                      weight, priority, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    backend.id,
                    backend.virtual_model_id,
                    backend.backend_name,
                    backend.backend_namespace,
                    backend.model_name_override,
                    backend.weight,
                    backend.priority,
                    backend.status.as_str(),
                    backend.created_at,
                    backend.updated_at,
                ],
            )
            .on_conflict(WeirError::BackendAlreadyExists)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn update_backend(&self, ctx: &RequestContext, backend: &VirtualModelBackend) -> Result<()> {
        let project = ctx.project_id();
        let backend = backend.clone();
        self.call(ctx, move |conn| {
            let changed = conn
                .execute(
                    "UPDATE virtual_model_backends
                     SET backend_name = ?1, backend_namespace = ?2, model_name_override = ?3,
                         weight = ?4, priority = ?5, status = ?6, updated_at = ?7
                     WHERE id = ?8
                       AND virtual_model_id IN (SELECT id FROM virtual_models WHERE project_id = ?9)",
                    params![
                        backend.backend_name,
                        backend.backend_namespace,
                        backend.model_name_override,
                        backend.weight,
                        backend.priority,
                        backend.status.as_str(),
                        backend.updated_at,
                        backend.id,
                        project,
                    ],
                )
                .on_conflict(WeirError::BackendAlreadyExists)?;
            expect_changed(changed, WeirError::BackendNotFound)
        })
        .await
    }

    async fn delete_backend(&self, ctx: &RequestContext, backend_id: Uuid) -> Result<()> {
        let project = ctx.project_id();
        self.call(ctx, move |conn| {
            let changed = conn.execute(
                "DELETE FROM virtual_model_backends
                 WHERE id = ?1
                   AND virtual_model_id IN (SELECT id FROM virtual_models WHERE project_id = ?2)",
                params![backend_id, project],
            )?;
            expect_changed(changed, WeirError::BackendNotFound)
        })
        .await
    }

    async fn list_backends(
        &self,
        ctx: &RequestContext,
        virtual_model_id: Uuid,
    ) -> Result<Vec<VirtualModelBackend>> {
        let project = ctx.project_id();
        self.call(ctx, move |conn| {
            if !vm_in_project(conn, virtual_model_id, project)? {
                return Err(WeirError::VirtualModelNotFound.into());
            }
            backends_of(conn, virtual_model_id)
        })
        .await
    }
}
