// Configuration
pub mod config;

// Inbound/outbound message model and record validation
pub mod event;

// Entity reconciler and sync metrics
pub mod state;

// REST snapshot loader
pub mod snapshot;

// Reconnecting event channel
pub mod channel;

// Map surface seam
pub mod surface;

// Marker lifecycle
pub mod markers;

// Marker motion
pub mod motion;

// Route overlay
pub mod route;

// Composition root and run loop
pub mod sync;
