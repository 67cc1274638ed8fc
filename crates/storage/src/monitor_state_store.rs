use std::str::FromStr;

use chrono::{DateTime, Utc};
use hackwatch_domain::model::{CycleReport, CycleStatus, MonitorState};
use hackwatch_domain::storage::{MonitorStateStore, StorageError, StorageResult};
use sea_orm::{sea_query::OnConflict, EntityTrait, Set};

use crate::entity::monitor_state;
use crate::SeaOrmStorage;

const STATE_ROW_ID: i32 = 1;

#[async_trait::async_trait]
impl MonitorStateStore for SeaOrmStorage {
    async fn record_cycle_started(&self, started_at: DateTime<Utc>) -> StorageResult<()> {
        let active = monitor_state::ActiveModel {
            id: Set(STATE_ROW_ID),
            status: Set(CycleStatus::Running.as_ref().to_string()),
            last_run: Set(started_at),
            last_completed: Set(None),
            last_error: Set(None),
            last_report: Set(None),
        };
        // An existing row keeps the previous cycle's completion columns.
        monitor_state::Entity::insert(active)
            .on_conflict(
                OnConflict::column(monitor_state::Column::Id)
                    .update_columns([monitor_state::Column::Status, monitor_state::Column::LastRun])
                    .to_owned(),
            )
            .exec_without_returning(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(())
    }

    async fn record_cycle_finished(
        &self,
        status: CycleStatus,
        report: &CycleReport,
        last_error: Option<&str>,
    ) -> StorageResult<()> {
        let encoded = serde_json::to_string(report).map_err(StorageError::from_source)?;
        let active = monitor_state::ActiveModel {
            id: Set(STATE_ROW_ID),
            status: Set(status.as_ref().to_string()),
            last_run: Set(report.started_at),
            last_completed: Set(Some(report.finished_at)),
            last_error: Set(last_error.map(str::to_string)),
            last_report: Set(Some(encoded)),
        };
        monitor_state::Entity::insert(active)
            .on_conflict(
                OnConflict::column(monitor_state::Column::Id)
                    .update_columns([
                        monitor_state::Column::Status,
                        monitor_state::Column::LastRun,
                        monitor_state::Column::LastCompleted,
                        monitor_state::Column::LastError,
                        monitor_state::Column::LastReport,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(())
    }

    async fn load_monitor_state(&self) -> StorageResult<Option<MonitorState>> {
        let maybe = monitor_state::Entity::find_by_id(STATE_ROW_ID)
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        maybe.map(state_from_model).transpose()
    }
}

fn state_from_model(model: monitor_state::Model) -> StorageResult<MonitorState> {
    let status = CycleStatus::from_str(&model.status).map_err(StorageError::from_source)?;
    let last_report = model
        .last_report
        .as_deref()
        .map(serde_json::from_str::<CycleReport>)
        .transpose()
        .map_err(StorageError::from_source)?;
    Ok(MonitorState {
        status,
        last_run: model.last_run,
        last_completed: model.last_completed,
        last_error: model.last_error,
        last_report,
    })
}
