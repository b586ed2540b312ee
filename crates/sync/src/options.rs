/// Knobs shared by both reconciliation directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Delete orphan and duplicate rows found while loading current state.
    pub heal: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self { heal: true }
    }
}
