use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::organization::{DepartmentId, FacilityId};
use crate::domain::overtime::{OvertimeRequest, OvertimeStatus};
use crate::domain::user::UserId;
use crate::errors::DomainError;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 50;

/// Filters plus 1-indexed pagination. Page bounds are checked on construction,
/// so a value of this type is always valid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestSearchCriteria {
    worker_id: Option<UserId>,
    department_id: Option<DepartmentId>,
    facility_id: Option<FacilityId>,
    customer_id: Option<UserId>,
    status: Option<OvertimeStatus>,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    page: u32,
    page_size: u32,
}

/// The single store query a search dispatches to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SearchKey {
    Worker(UserId),
    Department(DepartmentId),
    Facility(FacilityId),
    Customer(UserId),
    Status(OvertimeStatus),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Filtered count before pagination.
    pub total: u64,
}

impl Default for RequestSearchCriteria {
    fn default() -> Self {
        Self {
            worker_id: None,
            department_id: None,
            facility_id: None,
            customer_id: None,
            status: None,
            start_date: None,
            end_date: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl RequestSearchCriteria {
    pub fn new(page: u32, page_size: u32) -> Result<Self, DomainError> {
        if page < 1 {
            return Err(DomainError::InvalidArgument(
                "page number must be greater than 0".to_owned(),
            ));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(DomainError::InvalidArgument(format!(
                "page size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        Ok(Self { page, page_size, ..Self::default() })
    }

    pub fn with_worker(mut self, worker_id: UserId) -> Self {
        self.worker_id = Some(worker_id);
        self
    }

    pub fn with_department(mut self, department_id: DepartmentId) -> Self {
        self.department_id = Some(department_id);
        self
    }

    pub fn with_facility(mut self, facility_id: FacilityId) -> Self {
        self.facility_id = Some(facility_id);
        self
    }

    pub fn with_customer(mut self, customer_id: UserId) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn with_status(mut self, status: OvertimeStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_date_range(
        mut self,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> Result<Self, DomainError> {
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if start > end {
                return Err(DomainError::InvalidArgument(
                    "search start date must not be after end date".to_owned(),
                ));
            }
        }

        self.start_date = start_date;
        self.end_date = end_date;
        Ok(self)
    }

    pub fn worker_id(&self) -> Option<&UserId> {
        self.worker_id.as_ref()
    }

    pub fn department_id(&self) -> Option<&DepartmentId> {
        self.department_id.as_ref()
    }

    pub fn facility_id(&self) -> Option<&FacilityId> {
        self.facility_id.as_ref()
    }

    pub fn customer_id(&self) -> Option<&UserId> {
        self.customer_id.as_ref()
    }

    pub fn status(&self) -> Option<OvertimeStatus> {
        self.status
    }

    pub fn start_date(&self) -> Option<DateTime<Utc>> {
        self.start_date
    }

    pub fn end_date(&self) -> Option<DateTime<Utc>> {
        self.end_date
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    /// Picks the store query to run.
    ///
    /// At most one identity key (worker, department, facility, customer) may be
    /// set; `status` is the key only when no identity key is present, otherwise
    /// it narrows the identity query.
    pub fn search_key(&self) -> Result<SearchKey, DomainError> {
        let mut keys = Vec::with_capacity(1);
        if let Some(id) = &self.worker_id {
            keys.push(SearchKey::Worker(id.clone()));
        }
        if let Some(id) = &self.department_id {
            keys.push(SearchKey::Department(id.clone()));
        }
        if let Some(id) = &self.facility_id {
            keys.push(SearchKey::Facility(id.clone()));
        }
        if let Some(id) = &self.customer_id {
            keys.push(SearchKey::Customer(id.clone()));
        }

        match (keys.len(), self.status) {
            (0, Some(status)) => Ok(SearchKey::Status(status)),
            (0, None) => Err(DomainError::InvalidArgument(
                "at least one of worker, department, facility, customer or status must be provided"
                    .to_owned(),
            )),
            (1, _) => Ok(keys.remove(0)),
            _ => Err(DomainError::InvalidArgument(
                "only one of worker, department, facility or customer may be provided".to_owned(),
            )),
        }
    }

    /// Date-range and status filters every store query applies after its key.
    pub fn admits(&self, request: &OvertimeRequest) -> bool {
        if self.start_date.is_some_and(|start| request.start_time() < start) {
            return false;
        }
        if self.end_date.is_some_and(|end| request.end_time() > end) {
            return false;
        }
        self.status.map_or(true, |status| request.status() == status)
    }

    /// Slices an already-filtered, ordered result set down to the requested page.
    pub fn paginate<T>(&self, filtered: Vec<T>) -> Page<T> {
        let total = filtered.len() as u64;
        let items = filtered
            .into_iter()
            .skip(self.offset() as usize)
            .take(self.page_size as usize)
            .collect();
        Page { items, total }
    }
}
