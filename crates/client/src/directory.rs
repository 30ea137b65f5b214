//! The canonical in-memory employee list and the CRUD operations that keep
//! it in step with the remote collection.
//!
//! Every operation settles local state only after the collection
//! acknowledges it, with one exception: `remove` drops the entry before the
//! delete is sent and does not restore it if the delete fails.

use crate::notifications::NotificationLog;
use crate::remote::{RemoteCollection, RemoteError};
use protocol::{Employee, NewEmployee};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};

/// Read-only view of the list handed to renderers.
pub type EmployeeList = Arc<Vec<Employee>>;

/// The dashboard shows the first entries of the list, at most this many.
pub const DASHBOARD_SIZE: usize = 5;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("validation failed: {0}")]
    Validation(&'static str),

    #[error("no employee selected")]
    NoSelection,
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Uncommitted copy of a record being edited in the detail view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    /// The record as last confirmed by the collection
    pub original: Employee,
    pub name: String,
}

impl Draft {
    pub fn new(original: Employee) -> Self {
        let name = original.name.clone();
        Draft { original, name }
    }

    pub fn id(&self) -> i64 {
        self.original.id
    }

    pub fn is_dirty(&self) -> bool {
        self.name != self.original.name
    }
}

pub struct DirectorySync {
    remote: Arc<dyn RemoteCollection>,
    log: NotificationLog,
    employees: watch::Sender<EmployeeList>,
    selection: watch::Sender<Option<Draft>>,

    // Creates go to the collection one at a time
    create_lock: Mutex<()>,
}

impl DirectorySync {
    pub fn new(remote: Arc<dyn RemoteCollection>, log: NotificationLog) -> Self {
        DirectorySync {
            remote,
            log,
            employees: watch::Sender::new(Arc::new(Vec::new())),
            selection: watch::Sender::new(None),
            create_lock: Mutex::new(()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<EmployeeList> {
        self.employees.subscribe()
    }

    pub fn snapshot(&self) -> EmployeeList {
        self.employees.borrow().clone()
    }

    pub fn find(&self, id: i64) -> Option<Employee> {
        self.employees.borrow().iter().find(|e| e.id == id).cloned()
    }

    pub fn dashboard(&self) -> Vec<Employee> {
        self.employees
            .borrow()
            .iter()
            .take(DASHBOARD_SIZE)
            .cloned()
            .collect()
    }

    pub fn log(&self) -> &NotificationLog {
        &self.log
    }

    /// Replace the list with the collection's contents, keeping its order.
    pub async fn load_all(&self) -> SyncResult<usize> {
        match self.remote.list(None).await {
            Ok(employees) => {
                let employees = dedupe(employees);
                let count = employees.len();
                self.employees.send_replace(Arc::new(employees));

                tracing::info!("Directory loaded with {} employees", count);
                self.log.add(format!("fetched {count} employees")).await;
                Ok(count)
            }
            Err(e) => {
                tracing::warn!("Failed to load directory: {}", e);
                self.log.add(format!("failed to fetch employees: {e}")).await;
                Err(e.into())
            }
        }
    }

    /// Create a record and append it to the end of the list.
    /// A blank name is a no-op and returns `Ok(None)`.
    pub async fn create(&self, name: &str) -> SyncResult<Option<Employee>> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }

        let _guard = self.create_lock.lock().await;
        match self.remote.create(NewEmployee::new(name)).await {
            Ok(employee) => {
                self.employees.send_modify(|list| {
                    let list = Arc::make_mut(list);
                    match list.iter().position(|e| e.same_entity(&employee)) {
                        Some(index) => list[index] = employee.clone(),
                        None => list.push(employee.clone()),
                    }
                });

                tracing::info!("Created employee {}", employee.id);
                self.log
                    .add(format!("added employee id={}", employee.id))
                    .await;
                Ok(Some(employee))
            }
            Err(e) => {
                tracing::warn!("Failed to create employee: {}", e);
                self.log
                    .add(format!("failed to add employee \"{name}\": {e}"))
                    .await;
                Err(e.into())
            }
        }
    }

    /// Commit a new name for `id`. The list entry, if loaded, is replaced
    /// only once the collection acknowledges the update.
    pub async fn rename(&self, id: i64, new_name: &str) -> SyncResult<Employee> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            self.log
                .add(format!("rejected empty name for employee id={id}"))
                .await;
            return Err(SyncError::Validation("name must not be empty"));
        }

        let updated = Employee::new(id, new_name);
        if let Err(e) = self.remote.update(&updated).await {
            tracing::warn!("Failed to update employee {}: {}", id, e);
            self.log
                .add(format!("failed to update employee id={id}: {e}"))
                .await;
            return Err(e.into());
        }

        self.employees.send_if_modified(|list| {
            let Some(index) = list.iter().position(|e| e.same_entity(&updated)) else {
                return false;
            };
            Arc::make_mut(list)[index] = updated.clone();
            true
        });
        self.selection.send_if_modified(|selection| match selection {
            Some(draft) if draft.id() == id => {
                draft.original = updated.clone();
                true
            }
            _ => false,
        });

        tracing::info!("Renamed employee {}", id);
        self.log.add(format!("updated employee id={id}")).await;
        Ok(updated)
    }

    /// Remove `id` from the list immediately, then delete it remotely.
    /// The entry is not restored if the delete fails.
    pub async fn remove(&self, id: i64) -> SyncResult<()> {
        let removed = self.employees.send_if_modified(|list| {
            if !list.iter().any(|e| e.id == id) {
                return false;
            }
            Arc::make_mut(list).retain(|e| e.id != id);
            true
        });
        self.selection.send_if_modified(|selection| close_if(selection, id));
        tracing::debug!("Removed employee {} locally (present: {})", id, removed);

        match self.remote.delete(id).await {
            Ok(()) => {
                tracing::info!("Deleted employee {}", id);
                self.log.add(format!("deleted employee id={id}")).await;
                Ok(())
            }
            Err(e) => {
                // The list stays diverged until the next load_all
                tracing::warn!("Failed to delete employee {}: {}", id, e);
                self.log
                    .add(format!("failed to delete employee id={id}: {e}"))
                    .await;
                Err(e.into())
            }
        }
    }

    /// Open the detail view for `id` with a fresh draft. The list is not touched.
    pub async fn select(&self, id: i64) -> SyncResult<Draft> {
        match self.remote.get(id).await {
            Ok(employee) => {
                let draft = Draft::new(employee);
                self.selection.send_replace(Some(draft.clone()));
                self.log.add(format!("fetched employee id={id}")).await;
                Ok(draft)
            }
            Err(e) => {
                tracing::warn!("Failed to fetch employee {}: {}", id, e);
                self.log
                    .add(format!("failed to fetch employee id={id}: {e}"))
                    .await;
                Err(e.into())
            }
        }
    }

    pub fn selection(&self) -> Option<Draft> {
        self.selection.borrow().clone()
    }

    pub fn subscribe_selection(&self) -> watch::Receiver<Option<Draft>> {
        self.selection.subscribe()
    }

    /// Change the draft's name without committing it.
    pub fn edit_name(&self, name: &str) -> SyncResult<()> {
        let mut edited = false;
        self.selection.send_if_modified(|selection| {
            let Some(draft) = selection else {
                return false;
            };
            draft.name = name.to_string();
            edited = true;
            true
        });

        if edited {
            Ok(())
        } else {
            Err(SyncError::NoSelection)
        }
    }

    /// Commit the draft and close the detail view. On failure the draft
    /// stays open with its uncommitted name.
    pub async fn save(&self) -> SyncResult<Employee> {
        let draft = self.selection().ok_or(SyncError::NoSelection)?;
        let saved = self.rename(draft.id(), &draft.name).await?;

        self.selection
            .send_if_modified(|selection| close_if(selection, saved.id));
        Ok(saved)
    }

    /// Discard the draft. Returns it if one was open.
    pub fn cancel(&self) -> Option<Draft> {
        self.selection.send_replace(None)
    }
}

fn close_if(selection: &mut Option<Draft>, id: i64) -> bool {
    if selection.as_ref().is_some_and(|draft| draft.id() == id) {
        *selection = None;
        return true;
    }
    false
}

// Keep the first occurrence of each id
fn dedupe(employees: Vec<Employee>) -> Vec<Employee> {
    let mut seen = HashSet::new();
    let before = employees.len();
    let unique: Vec<Employee> = employees
        .into_iter()
        .filter(|e| seen.insert(e.id))
        .collect();

    if unique.len() != before {
        tracing::warn!(
            "Collection returned {} duplicate ids",
            before - unique.len()
        );
    }
    unique
}
