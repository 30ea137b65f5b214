// In-memory employee collection

use crate::file_store::FileStore;
use protocol::{matches_name, Employee, ErrorKind, Reply, Request};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Seed data served by this deployment. Id 15 is Magneta.
pub const FIXTURE: &[(i64, &str)] = &[
    (11, "Dr Nice"),
    (12, "Narco"),
    (13, "Bombasto"),
    (14, "Celeritas"),
    (15, "Magneta"),
    (16, "RubberMan"),
    (17, "Dynama"),
    (18, "Dr IQ"),
    (19, "Magma"),
    (20, "Tornado"),
];

pub fn fixture() -> Vec<Employee> {
    FIXTURE
        .iter()
        .map(|(id, name)| Employee::new(*id, *name))
        .collect()
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("employee {0} not found")]
    NotFound(i64),

    #[error("employee name must not be empty")]
    InvalidName,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::InvalidName => ErrorKind::Invalid,
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Ordered collection keyed by id. Order is insertion order.
#[derive(Clone)]
pub struct EmployeeStore {
    employees: Arc<RwLock<Vec<Employee>>>,

    // Snapshot target, rewritten after every mutation
    file_store: Option<Arc<FileStore>>,
}

impl EmployeeStore {
    pub fn new(employees: Vec<Employee>) -> Self {
        EmployeeStore {
            employees: Arc::new(RwLock::new(employees)),
            file_store: None,
        }
    }

    pub fn with_fixture() -> Self {
        Self::new(fixture())
    }

    /// Open a store backed by a snapshot file; `fallback` is used when no
    /// snapshot exists yet.
    pub async fn with_snapshot(
        file_store: FileStore,
        fallback: Vec<Employee>,
    ) -> anyhow::Result<Self> {
        let employees = match file_store.load_collection().await? {
            Some(stored) => {
                tracing::info!(
                    "Restored {} employees from {}",
                    stored.employees.len(),
                    file_store.path().display()
                );
                stored.employees
            }
            None => fallback,
        };

        let store = EmployeeStore {
            employees: Arc::new(RwLock::new(employees)),
            file_store: Some(Arc::new(file_store)),
        };
        store.persist().await;
        Ok(store)
    }

    /// All records whose name contains `filter` (case-insensitive), in collection order
    pub async fn list(&self, filter: Option<&str>) -> Vec<Employee> {
        let employees = self.employees.read().await;
        match filter {
            Some(filter) => employees
                .iter()
                .filter(|e| matches_name(&e.name, filter))
                .cloned()
                .collect(),
            None => employees.clone(),
        }
    }

    pub async fn get(&self, id: i64) -> StoreResult<Employee> {
        let employees = self.employees.read().await;
        employees
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    /// Append a new record with id = max + 1 (1 for an empty collection)
    pub async fn create(&self, name: &str) -> StoreResult<Employee> {
        let name = valid_name(name)?;

        let employee = {
            let mut employees = self.employees.write().await;
            let id = next_id(&employees);
            let employee = Employee::new(id, name);
            employees.push(employee.clone());
            employee
        };

        tracing::info!("Created employee {}", employee);
        self.persist().await;
        Ok(employee)
    }

    /// Replace the stored record with the same id
    pub async fn update(&self, employee: Employee) -> StoreResult<Employee> {
        let name = valid_name(&employee.name)?.to_string();

        {
            let mut employees = self.employees.write().await;
            let slot = employees
                .iter_mut()
                .find(|e| e.id == employee.id)
                .ok_or(StoreError::NotFound(employee.id))?;
            slot.name = name;
        }

        tracing::info!("Updated employee {}", employee.id);
        self.persist().await;
        self.get(employee.id).await
    }

    pub async fn delete(&self, id: i64) -> StoreResult<()> {
        {
            let mut employees = self.employees.write().await;
            let index = employees
                .iter()
                .position(|e| e.id == id)
                .ok_or(StoreError::NotFound(id))?;
            employees.remove(index);
        }

        tracing::info!("Deleted employee {}", id);
        self.persist().await;
        Ok(())
    }

    /// Execute a wire request against the store
    pub async fn handle(&self, request: Request) -> Reply {
        let result = match request {
            Request::List { name } => Ok(Reply::Employees {
                employees: self.list(name.as_deref()).await,
            }),
            Request::Get { id } => self
                .get(id)
                .await
                .map(|employee| Reply::Employee { employee }),
            Request::Create { employee } => self
                .create(&employee.name)
                .await
                .map(|employee| Reply::Employee { employee }),
            Request::Update { employee } => self.update(employee).await.map(|_| Reply::Done),
            Request::Delete { id } => self.delete(id).await.map(|_| Reply::Done),
        };

        result.unwrap_or_else(|e| Reply::error(e.kind(), e.to_string()))
    }

    // Best-effort snapshot; the in-memory state stays authoritative
    async fn persist(&self) {
        let Some(file_store) = &self.file_store else {
            return;
        };

        let employees = self.employees.read().await.clone();
        if let Err(e) = file_store.save_collection(&employees).await {
            tracing::error!("Failed to write snapshot: {:#}", e);
        }
    }
}

fn valid_name(name: &str) -> StoreResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::InvalidName);
    }
    Ok(name)
}

fn next_id(employees: &[Employee]) -> i64 {
    employees.iter().map(|e| e.id).max().map_or(1, |max| max + 1)
}
