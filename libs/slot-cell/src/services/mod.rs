pub mod clock;
pub mod keys;
pub mod mapper;
pub mod orchestrator;
pub mod provider;
pub mod resolvers;
pub mod upstream;

pub use clock::{Clock, FixedClock, ReferenceClock};
pub use keys::{reservation_key, SlotCacheKeys};
pub use mapper::DaySlotMapper;
pub use orchestrator::{SlotOrchestrator, SlotServices};
pub use provider::{BifrostSlotProvider, SlotProvider};
pub use resolvers::{
    FacilityResolver, ListingServiceResolver, PackageOnboardingResolver, PackageResolver,
};
pub use upstream::UpstreamClient;
