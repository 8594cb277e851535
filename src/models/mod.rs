pub mod finding;
pub mod work_item;
pub mod session;
pub mod scan_tree;

pub use finding::*;
pub use work_item::*;
pub use session::*;
pub use scan_tree::*;
