//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Registration lifecycle for pluggable option handlers.

use crate::connection::Context;
use crate::result::TelnetResult;
use std::sync::Arc;

/// A pluggable option handler.
///
/// `register` attaches listeners and opts its options in on the allow
/// policy; `unregister` detaches the listeners and revokes the policy,
/// restoring whatever prior state the handler documents.
pub trait Handler: Send + Sync {
    /// Attach to a connection.
    fn register(&self, ctx: &Context) -> TelnetResult<()>;
    /// Detach from a connection.
    fn unregister(&self, ctx: &Context) -> TelnetResult<()>;
}

/// Guard returned by `register_handler`; consuming it detaches the handler.
#[must_use = "dropping the registration leaves the handler attached"]
pub struct HandlerRegistration {
    ctx: Context,
    handler: Arc<dyn Handler>,
}

impl HandlerRegistration {
    pub(crate) fn new(ctx: Context, handler: Arc<dyn Handler>) -> HandlerRegistration {
        HandlerRegistration { ctx, handler }
    }

    /// Detach the handler from the connection it was registered on.
    pub fn unregister(self) -> TelnetResult<()> {
        self.handler.unregister(&self.ctx)
    }
}
