pub mod field;
pub mod issue;
pub mod issue_type;
pub mod project;
pub mod search;
pub mod status;
pub mod transition;
pub mod user;

pub use field::*;
pub use issue::*;
pub use issue_type::*;
pub use project::*;
pub use search::*;
pub use status::*;
pub use transition::*;
pub use user::*;
