use std::sync::Arc;

use tracing::{debug, info, instrument};

use shared_database::store::STAFF_NOT_FOUND;
use shared_database::Store;
use shared_models::directory::{DepartmentDetails, ScheduleEntry, StaffType, StaffView};
use shared_models::error::AppError;
use shared_models::response::Page;
use shared_utils::password::hash_password;
use shared_utils::AppState;

use crate::models::{CreateStaffRequest, ScheduleQuery, StaffListQuery, UpdateStaffRequest};

pub struct StaffService {
    store: Arc<dyn Store>,
}

impl StaffService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
        }
    }

    pub async fn list_staff(
        &self,
        query: StaffListQuery,
        forced_type: Option<StaffType>,
    ) -> Result<Page<StaffView>, AppError> {
        let page = query.page();
        let (staff, total) = self.store.list_staff(query.filter(forced_type), page).await?;
        debug!("Listed {} of {} staff members", staff.len(), total);
        Ok(Page::new(staff, total, page).map(StaffView::from))
    }

    pub async fn get_staff(&self, id: i64) -> Result<StaffView, AppError> {
        self.store
            .find_staff(id)
            .await?
            .map(StaffView::from)
            .ok_or_else(|| AppError::NotFound(STAFF_NOT_FOUND.to_string()))
    }

    #[instrument(skip(self, request), fields(staff_type = %request.staff_type))]
    pub async fn create_staff(&self, request: CreateStaffRequest) -> Result<StaffView, AppError> {
        let password_hash = hash_password(&request.password)?;
        let (user, staff) = request.into_parts(password_hash);

        let created = self.store.create_staff(user, staff).await?;
        info!("Created staff member {} for user {:?}", created.staff.id, created.staff.user_id);
        Ok(created.into())
    }

    #[instrument(skip(self, request))]
    pub async fn update_staff(
        &self,
        id: i64,
        request: UpdateStaffRequest,
    ) -> Result<StaffView, AppError> {
        let updated = self.store.update_staff(id, request.into()).await?;
        debug!("Updated staff member {}", id);
        Ok(updated.into())
    }

    /// Removes the staff row and deactivates the linked account.
    #[instrument(skip(self))]
    pub async fn delete_staff(&self, id: i64) -> Result<(), AppError> {
        self.store.delete_staff(id).await?;
        info!("Deleted staff member {}", id);
        Ok(())
    }

    pub async fn schedule(
        &self,
        id: i64,
        query: ScheduleQuery,
    ) -> Result<Vec<ScheduleEntry>, AppError> {
        if self.store.find_staff(id).await?.is_none() {
            return Err(AppError::NotFound(STAFF_NOT_FOUND.to_string()));
        }

        Ok(self.store.staff_schedule(id, query.range()).await?)
    }

    pub async fn departments(&self) -> Result<Vec<DepartmentDetails>, AppError> {
        Ok(self.store.list_departments().await?)
    }
}
