// In-process collection with injectable latency and failures

#![allow(dead_code)]

use async_trait::async_trait;
use client::{RemoteCollection, RemoteError, RemoteResult};
use protocol::{matches_name, Employee, NewEmployee};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    List,
    Get,
    Create,
    Update,
    Delete,
}

#[derive(Default)]
pub struct FakeCollection {
    employees: Mutex<Vec<Employee>>,
    latency: Mutex<HashMap<Op, Duration>>,
    // Per-filter latency for list, overriding `latency`
    list_latency: Mutex<HashMap<String, Duration>>,
    failing: Mutex<HashSet<Op>>,
    calls: Mutex<Vec<String>>,
    creates_in_flight: AtomicUsize,
    max_creates_in_flight: AtomicUsize,
}

impl FakeCollection {
    pub fn with_fixture() -> Self {
        Self::with_employees(
            FIXTURE
                .iter()
                .map(|(id, name)| Employee::new(*id, *name))
                .collect(),
        )
    }

    pub fn with_employees(employees: Vec<Employee>) -> Self {
        FakeCollection {
            employees: Mutex::new(employees),
            ..Default::default()
        }
    }

    pub fn set_latency(&self, op: Op, latency: Duration) {
        self.latency.lock().unwrap().insert(op, latency);
    }

    pub fn set_list_latency(&self, filter: &str, latency: Duration) {
        self.list_latency
            .lock()
            .unwrap()
            .insert(filter.to_string(), latency);
    }

    pub fn fail(&self, op: Op) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn recover(&self, op: Op) {
        self.failing.lock().unwrap().remove(&op);
    }

    pub fn stored(&self) -> Vec<Employee> {
        self.employees.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_creates_in_flight(&self) -> usize {
        self.max_creates_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, op: Op, call: String, latency: Option<Duration>) -> RemoteResult<()> {
        self.calls.lock().unwrap().push(call);

        let latency = latency.or_else(|| self.latency.lock().unwrap().get(&op).copied());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if self.failing.lock().unwrap().contains(&op) {
            return Err(RemoteError::Transport(format!("{:?} failed", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteCollection for FakeCollection {
    async fn list(&self, filter: Option<&str>) -> RemoteResult<Vec<Employee>> {
        let latency = filter.and_then(|f| self.list_latency.lock().unwrap().get(f).copied());
        self.enter(Op::List, format!("list:{}", filter.unwrap_or("")), latency)
            .await?;

        let employees = self.employees.lock().unwrap();
        Ok(employees
            .iter()
            .filter(|e| filter.map_or(true, |f| matches_name(&e.name, f)))
            .cloned()
            .collect())
    }

    async fn get(&self, id: i64) -> RemoteResult<Employee> {
        self.enter(Op::Get, format!("get:{id}"), None).await?;

        let employees = self.employees.lock().unwrap();
        employees
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or(RemoteError::NotFound(id))
    }

    async fn create(&self, employee: NewEmployee) -> RemoteResult<Employee> {
        let in_flight = self.creates_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_creates_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);

        let result = self
            .enter(Op::Create, format!("create:{}", employee.name), None)
            .await;
        self.creates_in_flight.fetch_sub(1, Ordering::SeqCst);
        result?;

        let mut employees = self.employees.lock().unwrap();
        let id = employees.iter().map(|e| e.id).max().map_or(1, |max| max + 1);
        let created = Employee::new(id, employee.name);
        employees.push(created.clone());
        Ok(created)
    }

    async fn update(&self, employee: &Employee) -> RemoteResult<()> {
        self.enter(Op::Update, format!("update:{}", employee.id), None)
            .await?;

        let mut employees = self.employees.lock().unwrap();
        let slot = employees
            .iter_mut()
            .find(|e| e.id == employee.id)
            .ok_or(RemoteError::NotFound(employee.id))?;
        slot.name = employee.name.clone();
        Ok(())
    }

    async fn delete(&self, id: i64) -> RemoteResult<()> {
        self.enter(Op::Delete, format!("delete:{id}"), None).await?;

        let mut employees = self.employees.lock().unwrap();
        let index = employees
            .iter()
            .position(|e| e.id == id)
            .ok_or(RemoteError::NotFound(id))?;
        employees.remove(index);
        Ok(())
    }
}
