mod article;
mod car;
mod credit;
mod package;
mod payment;
mod transaction;
mod users;

pub use article::*;
pub use car::*;
pub use credit::*;
pub use package::*;
pub use payment::*;
pub use transaction::*;
pub use users::*;
