//! Domain models.
//!
//! Database-backed entities derive `sqlx::FromRow` directly where no
//! validation is needed; [`User`] goes through a row type because its email
//! is re-parsed on load.

pub mod cart;
pub mod order;
pub mod payment;
pub mod product;
pub mod session;
pub mod store;
pub mod user;

pub use cart::{Cart, CartEntry, StoreCart};
pub use order::{NewOrder, NewOrderLine, Order, OrderItem, OrderWithItems};
pub use payment::Payment;
pub use product::Product;
pub use session::{CurrentUser, PendingPaypalPayment};
pub use store::Store;
pub use user::User;
