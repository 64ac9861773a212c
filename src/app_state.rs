use std::sync::Arc;

use crate::services::{ClassLabels, ImagePipeline};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ImagePipeline>,
    pub labels: Arc<ClassLabels>,
}
