pub mod choice;
pub mod reconciler;
pub mod role_manager;
pub mod scheduler;
pub mod verification_manager;
pub mod war_tracker;

pub use choice::{ChoiceOutcome, ChoicePrompter};
pub use reconciler::{create_shared_reconciler, ReconcileSummary, Reconciler, SharedReconciler};
pub use role_manager::{create_shared_role_manager, RoleManager, SharedRoleManager};
pub use scheduler::{Scheduler, SharedScheduler};
pub use verification_manager::{
    CancelReason, SessionOutcome, SharedVerificationManager, VerificationManager,
    VerificationSettings,
};
pub use war_tracker::{SharedWarTracker, WarReport, WarTracker};
