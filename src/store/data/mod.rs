mod link;
mod node;
mod object;

pub use link::LinkRecord;
pub use node::NodeRecord;
pub use object::ObjectRecord;
