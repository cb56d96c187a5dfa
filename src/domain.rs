//! Domain module - catalog entities, vendor policies and boundary traits
//!
//! Each module is its own file in the domain/ directory; commonly used items
//! are re-exported here.

pub mod credentials;
pub mod product;
pub mod repositories;
pub mod vendor_policy;

pub use credentials::{CredentialError, Credentials};
pub use product::{OfficeId, Price, PriceInfo, ProductId, ProductRecord, ProductStatus};
pub use repositories::{CatalogError, CatalogStore, CredentialProvider, ProductSelector};
pub use vendor_policy::{VendorPolicy, VendorPolicyTable};
