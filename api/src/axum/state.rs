use docchat::Pipeline;
use std::sync::Arc;

pub struct State {
    pub pipeline: Pipeline,
}

#[allow(clippy::module_name_repetitions)]
pub type AppState = Arc<State>;

pub fn create(pipeline: Pipeline) -> AppState {
    Arc::new(State { pipeline })
}
