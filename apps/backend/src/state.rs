use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use rowforge::llm::CompletionModel;
use rowforge::pipeline::{JobLog, JobStatus};

use crate::config::Config;

/// One uploaded job. Lives in memory only; nothing survives a restart.
#[derive(Debug)]
pub struct Task {
    pub log: JobLog,
    pub status: RwLock<JobStatus>,
    pub out_path: PathBuf,
}

impl Task {
    pub fn new(log: JobLog, out_path: PathBuf) -> Self {
        Self {
            log,
            status: RwLock::new(JobStatus::Pending),
            out_path,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status.read().map(|s| *s).unwrap_or(JobStatus::Failed)
    }

    pub fn set_status(&self, status: JobStatus) {
        if let Ok(mut s) = self.status.write() {
            *s = status;
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub model: Arc<dyn CompletionModel>,
    pub tasks: Arc<DashMap<String, Arc<Task>>>,
}

impl AppState {
    pub fn new(config: Config, model: Arc<dyn CompletionModel>) -> Self {
        Self {
            config: Arc::new(config),
            model,
            tasks: Arc::new(DashMap::new()),
        }
    }

    pub fn task(&self, task_id: &str) -> Option<Arc<Task>> {
        self.tasks.get(task_id).map(|t| Arc::clone(t.value()))
    }
}
