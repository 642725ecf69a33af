//! # Handler descriptors and invokers.
//!
//! A [`HandlerDescriptor`] describes one handler of a listener type: the
//! message type(s) it is declared for, its flags, and the [`Invoke`]
//! capability that runs it.
//!
//! ## Flags
//! - `accept_subtypes` (default `true`): also receive subtypes of the declared types
//! - `enabled` (default `true`): a disabled handler is never bound
//! - `synchronized` (default `false`): never overlaps another synchronized
//!   invocation on the same listener instance
//!
//! ## Invokers
//! ```text
//! HandlerDescriptor::on(|l, m| ..)       ─► typed closure, views arg as M
//! HandlerDescriptor::on2 / on3           ─► typed closures for 2 / 3 args
//! HandlerDescriptor::on_array(|l, a| ..) ─► receives the whole MessageArray
//! HandlerDescriptor::on_any(ty, |l, m| ..)─► erased message, any declared type
//! HandlerDescriptor::new(types, invoker) ─► custom (async) Invoke impl
//! ```
//!
//! A message that cannot be viewed as the declared type (a subtype that does
//! not expose the ancestor through [`Message::upcast`](crate::Message::upcast))
//! fails with [`InvocationError::Incompatible`].

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{HandlerError, InvocationError};
use crate::types::{AnyMessage, Message, MessageArray, MessageType};

use super::listener::Listener;

/// Executes a handler for a listener instance.
///
/// `messages` holds one entry per declared parameter, in declaration order.
#[async_trait]
pub trait Invoke<L>: Send + Sync + 'static {
    async fn invoke(&self, listener: &L, messages: &[Arc<dyn AnyMessage>]) -> Result<(), HandlerError>;
}

/// Immutable description of one handler on a listener type `L`.
pub struct HandlerDescriptor<L> {
    types: Vec<MessageType>,
    accept_subtypes: bool,
    enabled: bool,
    synchronized: bool,
    invoker: Arc<dyn Invoke<L>>,
}

impl<L: Listener> HandlerDescriptor<L> {
    /// Handler for custom [`Invoke`] implementations.
    pub fn new<I: Invoke<L>>(types: Vec<MessageType>, invoker: I) -> Self {
        Self {
            types,
            accept_subtypes: true,
            enabled: true,
            synchronized: false,
            invoker: Arc::new(invoker),
        }
    }

    /// Handler for a single message of type `M`.
    pub fn on<M, F>(f: F) -> Self
    where
        M: Message,
        F: Fn(&L, &M) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        Self::new(vec![MessageType::of::<M>()], Typed1 { f, _m: PhantomData })
    }

    /// Handler for two messages published together.
    pub fn on2<A, B, F>(f: F) -> Self
    where
        A: Message,
        B: Message,
        F: Fn(&L, &A, &B) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        Self::new(
            vec![MessageType::of::<A>(), MessageType::of::<B>()],
            Typed2 { f, _m: PhantomData },
        )
    }

    /// Handler for three messages published together.
    pub fn on3<A, B, C, F>(f: F) -> Self
    where
        A: Message,
        B: Message,
        C: Message,
        F: Fn(&L, &A, &B, &C) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        Self::new(
            vec![
                MessageType::of::<A>(),
                MessageType::of::<B>(),
                MessageType::of::<C>(),
            ],
            Typed3 { f, _m: PhantomData },
        )
    }

    /// Handler for arrays whose element type is `M` (or, with subtypes
    /// accepted, arrays of its subtypes).
    pub fn on_array<M, F>(f: F) -> Self
    where
        M: Message,
        F: Fn(&L, &MessageArray) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        Self::new(vec![MessageType::of::<M>().array()], ArrayFn { f })
    }

    /// Handler receiving the erased message, declared for `ty`.
    ///
    /// Use [`MessageType::any`] to observe every publication.
    pub fn on_any<F>(ty: MessageType, f: F) -> Self
    where
        F: Fn(&L, &dyn AnyMessage) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        Self::new(vec![ty], ErasedFn { f })
    }

    /// Sets whether subtypes of the declared types are delivered.
    #[must_use]
    pub fn accept_subtypes(mut self, accept: bool) -> Self {
        self.accept_subtypes = accept;
        self
    }

    /// Marks the handler as synchronized per listener instance.
    ///
    /// The per-instance monitor is not reentrant: a synchronized handler must
    /// not synchronously publish into another synchronized handler of the
    /// same instance.
    #[must_use]
    pub fn synchronized(mut self) -> Self {
        self.synchronized = true;
        self
    }

    /// Sets whether the handler is bound at all.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Shorthand for `enabled(false)`.
    #[must_use]
    pub fn disabled(self) -> Self {
        self.enabled(false)
    }

    pub fn message_types(&self) -> &[MessageType] {
        &self.types
    }

    pub fn accepts_subtypes(&self) -> bool {
        self.accept_subtypes
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    pub(crate) fn erase(self) -> ErasedHandler {
        ErasedHandler {
            signature: self.types.into_boxed_slice(),
            accept_subtypes: self.accept_subtypes,
            synchronized: self.synchronized,
            invoker: Arc::new(Bound { inner: self.invoker }),
        }
    }
}

/// Type-erased descriptor stored in a subscription.
pub(crate) struct ErasedHandler {
    pub(crate) signature: Box<[MessageType]>,
    pub(crate) accept_subtypes: bool,
    pub(crate) synchronized: bool,
    pub(crate) invoker: Arc<dyn ErasedInvoke>,
}

#[async_trait]
pub(crate) trait ErasedInvoke: Send + Sync {
    async fn invoke(
        &self,
        listener: &(dyn Any + Send + Sync),
        messages: &[Arc<dyn AnyMessage>],
    ) -> Result<(), InvocationError>;
}

struct Bound<L> {
    inner: Arc<dyn Invoke<L>>,
}

#[async_trait]
impl<L: Listener> ErasedInvoke for Bound<L> {
    async fn invoke(
        &self,
        listener: &(dyn Any + Send + Sync),
        messages: &[Arc<dyn AnyMessage>],
    ) -> Result<(), InvocationError> {
        let listener = listener
            .downcast_ref::<L>()
            .ok_or(InvocationError::ListenerMismatch { expected: L::name() })?;
        self.inner
            .invoke(listener, messages)
            .await
            .map_err(InvocationError::from_handler)
    }
}

fn arg<'a, M: Any>(messages: &'a [Arc<dyn AnyMessage>], index: usize) -> Result<&'a M, HandlerError> {
    let expected = std::any::type_name::<M>();
    let message = messages.get(index).ok_or(InvocationError::Incompatible {
        expected,
        actual: "<missing>",
    })?;
    message.view::<M>().ok_or_else(|| {
        InvocationError::Incompatible {
            expected,
            actual: message.type_name(),
        }
        .into()
    })
}

struct Typed1<M, F> {
    f: F,
    _m: PhantomData<fn(&M)>,
}

#[async_trait]
impl<L, M, F> Invoke<L> for Typed1<M, F>
where
    L: Listener,
    M: Message,
    F: Fn(&L, &M) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    async fn invoke(&self, listener: &L, messages: &[Arc<dyn AnyMessage>]) -> Result<(), HandlerError> {
        (self.f)(listener, arg::<M>(messages, 0)?)
    }
}

struct Typed2<A, B, F> {
    f: F,
    _m: PhantomData<fn(&A, &B)>,
}

#[async_trait]
impl<L, A, B, F> Invoke<L> for Typed2<A, B, F>
where
    L: Listener,
    A: Message,
    B: Message,
    F: Fn(&L, &A, &B) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    async fn invoke(&self, listener: &L, messages: &[Arc<dyn AnyMessage>]) -> Result<(), HandlerError> {
        (self.f)(listener, arg::<A>(messages, 0)?, arg::<B>(messages, 1)?)
    }
}

struct Typed3<A, B, C, F> {
    f: F,
    _m: PhantomData<fn(&A, &B, &C)>,
}

#[async_trait]
impl<L, A, B, C, F> Invoke<L> for Typed3<A, B, C, F>
where
    L: Listener,
    A: Message,
    B: Message,
    C: Message,
    F: Fn(&L, &A, &B, &C) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    async fn invoke(&self, listener: &L, messages: &[Arc<dyn AnyMessage>]) -> Result<(), HandlerError> {
        (self.f)(
            listener,
            arg::<A>(messages, 0)?,
            arg::<B>(messages, 1)?,
            arg::<C>(messages, 2)?,
        )
    }
}

struct ArrayFn<F> {
    f: F,
}

#[async_trait]
impl<L, F> Invoke<L> for ArrayFn<F>
where
    L: Listener,
    F: Fn(&L, &MessageArray) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    async fn invoke(&self, listener: &L, messages: &[Arc<dyn AnyMessage>]) -> Result<(), HandlerError> {
        (self.f)(listener, arg::<MessageArray>(messages, 0)?)
    }
}

struct ErasedFn<F> {
    f: F,
}

#[async_trait]
impl<L, F> Invoke<L> for ErasedFn<F>
where
    L: Listener,
    F: Fn(&L, &dyn AnyMessage) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    async fn invoke(&self, listener: &L, messages: &[Arc<dyn AnyMessage>]) -> Result<(), HandlerError> {
        let message = messages.first().ok_or(InvocationError::Incompatible {
            expected: "any",
            actual: "<missing>",
        })?;
        (self.f)(listener, message.as_ref())
    }
}
