//! A "prelude" for users of the `trawler` crate.
//!
//! Re-exports the pieces almost every embedding needs: the scheduler, the
//! monitor, the data model and the collaborator contracts.
//!
//! # Example
//!
//! ```
//! use trawler::prelude::*;
//! ```

pub use crate::{
    monitoring,
    ChannelArgs,
    CrawlerError,
    Data,
    ErrorKind,
    GenHttpClient,
    HttpClient,
    Item,
    MonitorArgs,
    ParseResponse,
    PoolArgs,
    ProcessItem,
    ReqwestClient,
    Request,
    Response,
    Scheduler,
    // essential re-export for HttpClient implementations
    async_trait,
};
