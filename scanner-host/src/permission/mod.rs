//! Camera permission handling
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       PermissionGate                          │
//! │  ┌──────────────────┐   ┌──────────────────────────────────┐  │
//! │  │ PermissionRecord │   │ PermissionProvider (OS seam)     │  │
//! │  │ - state          │   │ - Auto   (answers immediately)   │  │
//! │  │ - refresh_needed │   │ - Manual (answered by tests)     │  │
//! │  │ - sticky_denied  │   │ - host platform implementation   │  │
//! │  └──────────────────┘   └──────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! A request never blocks the command queue. The provider answers through a
//! [`PermissionReply`], which posts the answer back to the session as a
//! message; the gate then classifies it with the OS rationale flag:
//!
//! | Answer  | Rationale shown | Outcome           |
//! |---------|-----------------|-------------------|
//! | Granted | -               | `Granted`         |
//! | Denied  | yes             | `DeniedTemporary` |
//! | Denied  | no              | `DeniedPermanent` |

pub mod gate;
pub mod provider;

pub use gate::{PermissionGate, PermissionOutcome, PermissionRecord, PermissionState};
pub use provider::{
    AutoPermissionProvider, ManualPermissionProvider, PermissionAnswer, PermissionProvider,
    PermissionReply,
};
