//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod discount;
pub mod payment;
pub mod review;
pub mod taxonomy;
pub mod user;

pub use product::{Product, ProductDetails, ProductError, ProductStatus, Variant};
pub use order::{checked_line_total, AppliedDiscount, LineItem, LineRejection, NewOrder, Order, OrderError, OrderStatus, PaymentDetails, PaymentMethod, PaymentStatus, ShippingAddress, TimelineEntry};
pub use cart::{Cart, CartError, CartItem, OrderDraft};
pub use discount::{Discount, DiscountError, DiscountKind, DiscountLine, DiscountTerms};
pub use payment::{PendingPayment, PendingState};
pub use review::{Review, ReviewError, ReviewStatus};
pub use taxonomy::{Brand, BrandDetails, Category, CategoryDetails, TaxonomyError};
pub use user::{Address, AddressError, AddressInput, AuthProvider, NotificationPreferences, OAuthProfile, Role, User, UserProfile};
