//! JSON fixtures describing a whole business: hours, catalog, bookings.
//!
//! ```json
//! {
//!   "company": { "service_interval": 30, "policy": { "level": "company", "slots": [
//!     { "day_of_week": 1, "start": 540, "end": 1080 } ] } },
//!   "categories": [ { "id": "...", "name": "Hair" } ],
//!   "services": [ { "id": "...", "category_id": "...", "name": "Cut", "duration": 30, "price": 2500 } ],
//!   "employees": [ { "id": "...", "name": "Alice", "policy": null, "category_policies": {} } ],
//!   "appointments": [],
//!   "blocks": []
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::EngineError;
use crate::limits::MAX_NAME_LEN;
use crate::model::*;
use crate::store::{AppointmentStore, BlockStore, MemoryStore, PolicyStore, StoreError};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("reading snapshot: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing snapshot: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid snapshot: {0}")]
    Invalid(String),
    #[error("invalid snapshot: {0}")]
    Engine(#[from] EngineError),
    #[error("loading snapshot: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub company: CompanySection,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub employees: Vec<EmployeeSection>,
    #[serde(default)]
    pub appointments: Vec<Appointment>,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanySection {
    /// Falls back to the configured default when absent.
    #[serde(default)]
    pub service_interval: Option<u32>,
    pub policy: WorkingHoursPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployeeSection {
    #[serde(flatten)]
    pub employee: Employee,
    #[serde(default)]
    pub policy: Option<WorkingHoursPolicy>,
    #[serde(default)]
    pub category_policies: HashMap<CategoryId, WorkingHoursPolicy>,
}

impl Snapshot {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Check cross references, then populate a fresh in-memory store.
    pub async fn into_store(self, default_service_interval: u32) -> Result<MemoryStore, SnapshotError> {
        self.check()?;

        let service_interval = self.company.service_interval.unwrap_or(default_service_interval);
        if service_interval == 0 {
            return Err(EngineError::InvalidInterval(service_interval).into());
        }
        let store = MemoryStore::new(CompanySchedule {
            service_interval,
            policy: self.company.policy,
        });

        for category in self.categories {
            store.insert_category(category);
        }
        for service in self.services {
            // Deserialization skips the constructor; run it again.
            let service = Service::new(
                service.id,
                service.category_id,
                service.name,
                service.duration,
                service.price,
            )?;
            store.insert_service(service);
        }
        for section in self.employees {
            let id = section.employee.id;
            store.insert_employee(section.employee);
            store.put_employee_policy(id, section.policy).await?;
            for (category_id, policy) in section.category_policies {
                store.put_category_policy(id, category_id, Some(policy)).await?;
            }
        }
        for block in self.blocks {
            let block = Block::new(block.id, block.employee_id, block.span.start, block.span.end)?;
            store.save_block(block).await?;
        }
        for appointment in self.appointments {
            store.save(appointment).await?;
        }
        Ok(store)
    }

    fn check(&self) -> Result<(), SnapshotError> {
        expect_level(&self.company.policy, HierarchyLevel::Company)?;

        let mut names = self
            .categories
            .iter()
            .map(|c| &c.name)
            .chain(self.services.iter().map(|s| &s.name))
            .chain(self.employees.iter().map(|e| &e.employee.name));
        if let Some(name) = names.find(|n| n.len() > MAX_NAME_LEN) {
            let head: String = name.chars().take(32).collect();
            return Err(SnapshotError::Invalid(format!("name too long: {head}...")));
        }

        for service in &self.services {
            if !self.categories.iter().any(|c| c.id == service.category_id) {
                return Err(SnapshotError::Invalid(format!(
                    "service {} refers to unknown category {}",
                    service.id, service.category_id
                )));
            }
        }
        for section in &self.employees {
            if let Some(policy) = &section.policy {
                expect_level(policy, HierarchyLevel::Employee)?;
            }
            for (category_id, policy) in &section.category_policies {
                if !self.categories.iter().any(|c| c.id == *category_id) {
                    return Err(SnapshotError::Invalid(format!(
                        "employee {} has hours for unknown category {category_id}",
                        section.employee.id
                    )));
                }
                expect_level(policy, HierarchyLevel::Category)?;
            }
        }
        for block in &self.blocks {
            self.expect_employee(block.employee_id)?;
        }
        for appointment in &self.appointments {
            self.expect_employee(appointment.employee_id)?;
            if appointment.services.is_empty() || appointment.total_duration == 0 {
                return Err(SnapshotError::Invalid(format!("appointment {} has no services", appointment.id)));
            }
            for id in &appointment.services {
                if !self.services.iter().any(|s| s.id == *id) {
                    return Err(SnapshotError::Invalid(format!(
                        "appointment {} refers to unknown service {id}",
                        appointment.id
                    )));
                }
            }
        }
        Ok(())
    }

    fn expect_employee(&self, id: EmployeeId) -> Result<(), SnapshotError> {
        if self.employees.iter().any(|e| e.employee.id == id) {
            Ok(())
        } else {
            Err(SnapshotError::Invalid(format!("unknown employee {id}")))
        }
    }
}

fn expect_level(policy: &WorkingHoursPolicy, expected: HierarchyLevel) -> Result<(), SnapshotError> {
    if policy.level() != expected {
        return Err(EngineError::WrongLevel {
            expected,
            found: policy.level(),
        }
        .into());
    }
    Ok(())
}
