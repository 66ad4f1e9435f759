//! Collaborator contracts the engine reads from and writes through, plus an
//! in-memory implementation of all of them.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::model::*;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn company_schedule(&self) -> Result<CompanySchedule, StoreError>;

    async fn company_policy(&self) -> Result<WorkingHoursPolicy, StoreError> {
        Ok(self.company_schedule().await?.policy)
    }

    async fn employee_policy(&self, employee_id: EmployeeId) -> Result<Option<WorkingHoursPolicy>, StoreError>;

    async fn category_policy(
        &self,
        employee_id: EmployeeId,
        category_id: CategoryId,
    ) -> Result<Option<WorkingHoursPolicy>, StoreError>;

    async fn put_company_schedule(&self, schedule: CompanySchedule) -> Result<(), StoreError>;

    /// `None` removes the override so the employee inherits company hours.
    async fn put_employee_policy(
        &self,
        employee_id: EmployeeId,
        policy: Option<WorkingHoursPolicy>,
    ) -> Result<(), StoreError>;

    async fn put_category_policy(
        &self,
        employee_id: EmployeeId,
        category_id: CategoryId,
        policy: Option<WorkingHoursPolicy>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn get(&self, id: AppointmentId) -> Result<Option<Appointment>, StoreError>;

    /// Pending and confirmed appointments of `employee_id` overlapping `range`.
    async fn list_non_terminal(&self, employee_id: EmployeeId, range: Span) -> Result<Vec<Appointment>, StoreError>;

    /// Every appointment of `employee_id` overlapping `range`, any status.
    async fn list(&self, employee_id: EmployeeId, range: Span) -> Result<Vec<Appointment>, StoreError>;

    async fn list_for_client(&self, client_id: ClientId) -> Result<Vec<Appointment>, StoreError>;

    /// Insert or replace by id.
    async fn save(&self, appointment: Appointment) -> Result<(), StoreError>;

    /// Insert only if the id is free, atomically. Returns false if it was taken.
    async fn insert_new(&self, appointment: Appointment) -> Result<bool, StoreError>;

    /// Returns false if the appointment does not exist.
    async fn update_status(&self, id: AppointmentId, status: AppointmentStatus) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait BlockStore: Send + Sync {
    async fn list_blocks(&self, employee_id: EmployeeId, range: Span) -> Result<Vec<Block>, StoreError>;

    async fn save_block(&self, block: Block) -> Result<(), StoreError>;

    /// Returns the removed block, if there was one.
    async fn delete_block(&self, id: BlockId) -> Result<Option<Block>, StoreError>;
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn employee(&self, id: EmployeeId) -> Result<Option<Employee>, StoreError>;

    async fn service(&self, id: ServiceId) -> Result<Option<Service>, StoreError>;

    async fn category(&self, id: CategoryId) -> Result<Option<Category>, StoreError>;
}

/// Handles to every collaborator the engine needs.
#[derive(Clone)]
pub struct Stores {
    pub policies: Arc<dyn PolicyStore>,
    pub appointments: Arc<dyn AppointmentStore>,
    pub blocks: Arc<dyn BlockStore>,
    pub catalog: Arc<dyn Catalog>,
}

impl Stores {
    /// All four collaborators backed by one in-memory store.
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            policies: store.clone(),
            appointments: store.clone(),
            blocks: store.clone(),
            catalog: store,
        }
    }
}

// ── In-memory implementation ─────────────────────────────────────

pub struct MemoryStore {
    company: RwLock<CompanySchedule>,
    employee_policies: DashMap<EmployeeId, WorkingHoursPolicy>,
    category_policies: DashMap<(EmployeeId, CategoryId), WorkingHoursPolicy>,
    employees: DashMap<EmployeeId, Employee>,
    categories: DashMap<CategoryId, Category>,
    services: DashMap<ServiceId, Service>,
    appointments: DashMap<AppointmentId, Appointment>,
    blocks: DashMap<BlockId, Block>,
}

impl MemoryStore {
    pub fn new(company: CompanySchedule) -> Self {
        Self {
            company: RwLock::new(company),
            employee_policies: DashMap::new(),
            category_policies: DashMap::new(),
            employees: DashMap::new(),
            categories: DashMap::new(),
            services: DashMap::new(),
            appointments: DashMap::new(),
            blocks: DashMap::new(),
        }
    }

    // ── Catalog population ───────────────────────────────────

    pub fn insert_employee(&self, employee: Employee) {
        self.employees.insert(employee.id, employee);
    }

    pub fn insert_category(&self, category: Category) {
        self.categories.insert(category.id, category);
    }

    pub fn insert_service(&self, service: Service) {
        self.services.insert(service.id, service);
    }

    pub fn appointment_count(&self) -> usize {
        self.appointments.len()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    fn sorted(mut appointments: Vec<Appointment>) -> Vec<Appointment> {
        appointments.sort_by_key(|a| (a.start, a.id));
        appointments
    }
}

#[async_trait]
impl PolicyStore for MemoryStore {
    async fn company_schedule(&self) -> Result<CompanySchedule, StoreError> {
        Ok(self.company.read().await.clone())
    }

    async fn employee_policy(&self, employee_id: EmployeeId) -> Result<Option<WorkingHoursPolicy>, StoreError> {
        Ok(self.employee_policies.get(&employee_id).map(|e| e.value().clone()))
    }

    async fn category_policy(
        &self,
        employee_id: EmployeeId,
        category_id: CategoryId,
    ) -> Result<Option<WorkingHoursPolicy>, StoreError> {
        Ok(self
            .category_policies
            .get(&(employee_id, category_id))
            .map(|e| e.value().clone()))
    }

    async fn put_company_schedule(&self, schedule: CompanySchedule) -> Result<(), StoreError> {
        *self.company.write().await = schedule;
        Ok(())
    }

    async fn put_employee_policy(
        &self,
        employee_id: EmployeeId,
        policy: Option<WorkingHoursPolicy>,
    ) -> Result<(), StoreError> {
        match policy {
            Some(p) => {
                self.employee_policies.insert(employee_id, p);
            }
            None => {
                self.employee_policies.remove(&employee_id);
            }
        }
        Ok(())
    }

    async fn put_category_policy(
        &self,
        employee_id: EmployeeId,
        category_id: CategoryId,
        policy: Option<WorkingHoursPolicy>,
    ) -> Result<(), StoreError> {
        let key = (employee_id, category_id);
        match policy {
            Some(p) => {
                self.category_policies.insert(key, p);
            }
            None => {
                self.category_policies.remove(&key);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AppointmentStore for MemoryStore {
    async fn get(&self, id: AppointmentId) -> Result<Option<Appointment>, StoreError> {
        Ok(self.appointments.get(&id).map(|e| e.value().clone()))
    }

    async fn list_non_terminal(&self, employee_id: EmployeeId, range: Span) -> Result<Vec<Appointment>, StoreError> {
        let hits = self
            .appointments
            .iter()
            .filter(|e| {
                let a = e.value();
                a.employee_id == employee_id && !a.status.is_terminal() && a.span().overlaps(&range)
            })
            .map(|e| e.value().clone())
            .collect();
        Ok(Self::sorted(hits))
    }

    async fn list(&self, employee_id: EmployeeId, range: Span) -> Result<Vec<Appointment>, StoreError> {
        let hits = self
            .appointments
            .iter()
            .filter(|e| e.value().employee_id == employee_id && e.value().span().overlaps(&range))
            .map(|e| e.value().clone())
            .collect();
        Ok(Self::sorted(hits))
    }

    async fn list_for_client(&self, client_id: ClientId) -> Result<Vec<Appointment>, StoreError> {
        let hits = self
            .appointments
            .iter()
            .filter(|e| e.value().client_id == client_id)
            .map(|e| e.value().clone())
            .collect();
        Ok(Self::sorted(hits))
    }

    async fn save(&self, appointment: Appointment) -> Result<(), StoreError> {
        self.appointments.insert(appointment.id, appointment);
        Ok(())
    }

    async fn insert_new(&self, appointment: Appointment) -> Result<bool, StoreError> {
        match self.appointments.entry(appointment.id) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(appointment);
                Ok(true)
            }
        }
    }

    async fn update_status(&self, id: AppointmentId, status: AppointmentStatus) -> Result<bool, StoreError> {
        match self.appointments.get_mut(&id) {
            Some(mut entry) => {
                entry.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl BlockStore for MemoryStore {
    async fn list_blocks(&self, employee_id: EmployeeId, range: Span) -> Result<Vec<Block>, StoreError> {
        let mut hits: Vec<Block> = self
            .blocks
            .iter()
            .filter(|e| e.value().employee_id == employee_id && e.value().span.overlaps(&range))
            .map(|e| e.value().clone())
            .collect();
        hits.sort_by_key(|b| (b.span.start, b.id));
        Ok(hits)
    }

    async fn save_block(&self, block: Block) -> Result<(), StoreError> {
        self.blocks.insert(block.id, block);
        Ok(())
    }

    async fn delete_block(&self, id: BlockId) -> Result<Option<Block>, StoreError> {
        Ok(self.blocks.remove(&id).map(|(_, block)| block))
    }
}

#[async_trait]
impl Catalog for MemoryStore {
    async fn employee(&self, id: EmployeeId) -> Result<Option<Employee>, StoreError> {
        Ok(self.employees.get(&id).map(|e| e.value().clone()))
    }

    async fn service(&self, id: ServiceId) -> Result<Option<Service>, StoreError> {
        Ok(self.services.get(&id).map(|e| e.value().clone()))
    }

    async fn category(&self, id: CategoryId) -> Result<Option<Category>, StoreError> {
        Ok(self.categories.get(&id).map(|e| e.value().clone()))
    }
}
