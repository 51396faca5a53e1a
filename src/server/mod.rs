//! REST API server for remote control of the show.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────┐    crossbeam channel     ┌──────────────────────┐
//! │   API Server Thread     │  ──── Input ──────────▶  │   Control Thread     │
//! │   (rouille HTTP)        │                          │   (runner loop)      │
//! │                         │                          │                      │
//! │  POST /api/pause        │  ─▶ Command(Pause) ──▶   │  slideshow.apply()   │
//! │  POST /api/rate/5       │  ─▶ Command(Rate(5)) ─▶  │  slideshow.apply()   │
//! │  GET  /api/status       │  ─▶ Status(reply) ───▶   │  reply.send(status)  │
//! └─────────────────────────┘  ◀── StatusReport ─────  └──────────────────────┘
//! ```
//!
//! There is no shared state: status queries are answered by the control thread
//! through a one-shot reply channel, with a bounded wait on the HTTP side.
//!
//! # Endpoints
//!
//! | Method | Path                          | Description                    |
//! |--------|-------------------------------|--------------------------------|
//! | GET    | `/api/health`                 | Health check                   |
//! | GET    | `/api/status`                 | Current slide, state, cache    |
//! | POST   | `/api/pause`                  | Pause / resume                 |
//! | POST   | `/api/rate/{n}`               | Rate current photo (1-5)       |
//! | POST   | `/api/rotate/{deg}`           | Rotate current photo (x90)     |
//! | POST   | `/api/jump/{k}`               | Jump k slides                  |
//! | POST   | `/api/email`                  | Open the email prompt          |
//! | POST   | `/api/email/type`             | Type text (JSON `{"text":..}`) |
//! | POST   | `/api/email/suggestion/{i}`   | Pick suggestion i              |
//! | POST   | `/api/email/send`             | Submit the prompt              |
//! | POST   | `/api/email/cancel`           | Close the prompt               |
//! | POST   | `/api/debug`                  | Toggle debug overlay           |
//! | POST   | `/api/aux`                    | Toggle aux panel               |
//! | POST   | `/api/ingest`                 | Toggle ingestion               |
//! | POST   | `/api/quit`                   | Quit                           |

mod api;

pub use api::{ApiServer, STATUS_TIMEOUT};
