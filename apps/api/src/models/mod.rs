pub mod activity;
pub mod occupation;
pub mod task;

pub use activity::DetailedActivity;
pub use occupation::OccupationProfile;
pub use task::UserTask;
