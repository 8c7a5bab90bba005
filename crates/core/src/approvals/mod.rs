use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::organization::{DepartmentId, UserRef};
use crate::domain::overtime::{OvertimeRequest, RoutingPlan};
use crate::domain::user::{UserId, UserRole, UserSummary};
use crate::errors::{ApplicationError, DirectoryError, DomainError};
use crate::ports::OrganizationDirectory;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingInput {
    pub worker_id: UserId,
    /// Falls back to the worker's own department when absent.
    pub department_id: Option<DepartmentId>,
    pub customer_id: Option<UserId>,
}

/// Decides, once per request, which approval stages apply and who holds them.
pub struct ApprovalRoutingResolver<D> {
    directory: Arc<D>,
}

impl<D> Clone for ApprovalRoutingResolver<D> {
    fn clone(&self) -> Self {
        Self { directory: Arc::clone(&self.directory) }
    }
}

impl<D> ApprovalRoutingResolver<D>
where
    D: OrganizationDirectory,
{
    pub fn new(directory: Arc<D>) -> Self {
        Self { directory }
    }

    pub async fn resolve(&self, input: &RoutingInput) -> Result<RoutingPlan, ApplicationError> {
        let worker = self
            .directory
            .get_user(&input.worker_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("user", &input.worker_id))?;

        let department_id = match &input.department_id {
            Some(id) => id.clone(),
            None => self.worker_department(&worker).await?,
        };

        let hierarchy = self.directory.get_department_hierarchy(&department_id).await?;
        let department = hierarchy.department.ok_or_else(|| {
            ApplicationError::DependencyNotFound(format!(
                "department {department_id} is missing from its own hierarchy"
            ))
        })?;
        let supervisor_ref = hierarchy.supervisor.ok_or_else(|| {
            ApplicationError::DependencyNotFound(format!(
                "department {department_id} has no supervisor on record"
            ))
        })?;
        let supervisor = self.directory.get_user(&supervisor_ref.id).await?.ok_or_else(|| {
            ApplicationError::DependencyNotFound(format!(
                "supervisor {} of department {department_id} is not a known user",
                supervisor_ref.id
            ))
        })?;

        let requires_manager_approval = !supervisor.can_approve_requests();
        if requires_manager_approval && hierarchy.manager.is_none() {
            return Err(ApplicationError::DependencyNotFound(format!(
                "facility {} has no manager on record",
                hierarchy.facility.id
            )));
        }

        let customer = match &input.customer_id {
            Some(customer_id) => Some(self.resolve_customer(customer_id).await?),
            None => None,
        };
        let requires_customer_approval =
            customer.as_ref().is_some_and(UserSummary::requires_request_approval);

        Ok(RoutingPlan {
            worker: worker.to_ref(),
            department,
            facility: hierarchy.facility,
            supervisor: supervisor.to_ref(),
            // bound on the first manager action
            manager: None,
            customer: customer.map(|customer| customer.to_ref()),
            requires_manager_approval,
            requires_customer_approval,
        })
    }

    pub async fn resolve_customer(
        &self,
        customer_id: &UserId,
    ) -> Result<UserSummary, ApplicationError> {
        let customer = self
            .directory
            .get_user(customer_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("customer", customer_id))?;

        if customer.role != UserRole::Customer {
            return Err(DomainError::InvalidArgument(format!(
                "user {customer_id} is a {} and cannot be named as customer",
                customer.role
            ))
            .into());
        }
        Ok(customer)
    }

    /// Looks up the facility manager for a request that has none bound yet and
    /// checks it against the acting manager.
    ///
    /// Returns `Ok(None)` when a manager is already on record; the aggregate's
    /// own approver check covers that case.
    pub async fn resolve_manager_binding(
        &self,
        request: &OvertimeRequest,
        actor_id: &UserId,
    ) -> Result<Option<UserRef>, ApplicationError> {
        if request.manager().is_some() {
            return Ok(None);
        }

        let hierarchy = self.directory.get_department_hierarchy(&request.department().id).await?;
        let manager = hierarchy.manager.ok_or_else(|| {
            ApplicationError::DependencyNotFound(format!(
                "facility {} has no manager on record",
                hierarchy.facility.id
            ))
        })?;

        if manager.id != *actor_id {
            return Err(DomainError::Unauthorized(format!(
                "{actor_id} is not the manager of facility {}",
                hierarchy.facility.id
            ))
            .into());
        }
        Ok(Some(manager))
    }

    async fn worker_department(
        &self,
        worker: &UserSummary,
    ) -> Result<DepartmentId, ApplicationError> {
        // the worker is known, so a missing membership is a missing link
        let membership = match self.directory.get_user_organization_info(&worker.id).await {
            Ok(info) => info.department.map(|department| department.id),
            Err(DirectoryError::NotFound { .. }) => None,
            Err(error) => return Err(error.into()),
        };
        membership
            .or_else(|| worker.department_id.clone())
            .ok_or_else(|| {
                ApplicationError::DependencyNotFound(format!(
                    "worker {} does not belong to a department",
                    worker.id
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use crate::domain::organization::DepartmentId;
    use crate::domain::overtime::{OvertimeRequest, OvertimeRequestDraft};
    use crate::domain::user::UserId;
    use crate::errors::ErrorKind;
    use crate::testing::{StaticDirectory, DEPARTMENT};

    use super::{ApprovalRoutingResolver, RoutingInput};

    fn input(customer: Option<&str>) -> RoutingInput {
        RoutingInput {
            worker_id: UserId::new("w-1"),
            department_id: Some(DepartmentId(DEPARTMENT.to_owned())),
            customer_id: customer.map(UserId::new),
        }
    }

    #[tokio::test]
    async fn supervisor_without_authority_requires_manager() {
        let resolver = ApprovalRoutingResolver::new(Arc::new(StaticDirectory::standard(false)));

        let plan = resolver.resolve(&input(Some("c-1"))).await.expect("plan");

        assert!(plan.requires_manager_approval);
        assert!(plan.requires_customer_approval);
        assert_eq!(plan.supervisor.id, UserId::new("s-1"));
        assert_eq!(plan.manager, None);
        assert_eq!(plan.customer.map(|customer| customer.id), Some(UserId::new("c-1")));
    }

    #[tokio::test]
    async fn supervisor_with_authority_and_lenient_customer_needs_no_further_stages() {
        let resolver = ApprovalRoutingResolver::new(Arc::new(StaticDirectory::standard(true)));

        let plan = resolver.resolve(&input(Some("c-2"))).await.expect("plan");

        assert!(!plan.requires_manager_approval);
        assert!(!plan.requires_customer_approval);
    }

    #[tokio::test]
    async fn department_falls_back_to_worker_membership() {
        let resolver = ApprovalRoutingResolver::new(Arc::new(StaticDirectory::standard(true)));
        let routing = RoutingInput { department_id: None, ..input(None) };

        let plan = resolver.resolve(&routing).await.expect("plan");

        assert_eq!(plan.department.id, DepartmentId(DEPARTMENT.to_owned()));
        assert_eq!(plan.customer, None);
    }

    #[tokio::test]
    async fn missing_supervisor_is_a_dependency_failure() {
        let directory = StaticDirectory::standard(false).with_department(None, Some("m-1"));
        let resolver = ApprovalRoutingResolver::new(Arc::new(directory));

        let error = resolver.resolve(&input(None)).await.expect_err("no supervisor");

        assert_eq!(error.kind(), ErrorKind::DependencyNotFound);
    }

    #[tokio::test]
    async fn missing_manager_only_matters_when_required() {
        let strict = ApprovalRoutingResolver::new(Arc::new(
            StaticDirectory::standard(false).with_department(Some("s-1"), None),
        ));
        let error = strict.resolve(&input(None)).await.expect_err("manager required");
        assert_eq!(error.kind(), ErrorKind::DependencyNotFound);

        let lenient = ApprovalRoutingResolver::new(Arc::new(
            StaticDirectory::standard(true).with_department(Some("s-1"), None),
        ));
        assert!(lenient.resolve(&input(None)).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_customer_and_worker_are_not_found() {
        let resolver = ApprovalRoutingResolver::new(Arc::new(StaticDirectory::standard(false)));

        let error = resolver.resolve(&input(Some("c-404"))).await.expect_err("unknown customer");
        assert_eq!(error.kind(), ErrorKind::NotFound);

        let routing = RoutingInput { worker_id: UserId::new("w-404"), ..input(None) };
        let error = resolver.resolve(&routing).await.expect_err("unknown worker");
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn non_customer_cannot_be_named_as_customer() {
        let resolver = ApprovalRoutingResolver::new(Arc::new(StaticDirectory::standard(false)));

        let error = resolver.resolve(&input(Some("m-1"))).await.expect_err("not a customer");

        assert_eq!(error.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn manager_binding_checks_the_facility_manager() {
        let resolver = ApprovalRoutingResolver::new(Arc::new(StaticDirectory::standard(false)));
        let plan = resolver.resolve(&input(None)).await.expect("plan");
        let start = Utc::now() + Duration::hours(2);
        let request = OvertimeRequest::new(OvertimeRequestDraft {
            start_time: start,
            end_time: start + Duration::hours(3),
            reason: "line changeover".to_owned(),
            plan,
        })
        .expect("request");

        let bound = resolver
            .resolve_manager_binding(&request, &UserId::new("m-1"))
            .await
            .expect("binding");
        assert_eq!(bound.map(|manager| manager.id), Some(UserId::new("m-1")));

        let error = resolver
            .resolve_manager_binding(&request, &UserId::new("m-2"))
            .await
            .expect_err("impostor");
        assert_eq!(error.kind(), ErrorKind::Unauthorized);
    }
}
