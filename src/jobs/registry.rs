//! Job registry: maps a [`JobIdentifier`] to a decoder + handler pair and
//! decodes opaque payload bytes into an invocable handler at dispatch time.
//!
//! This is the framework's sole polymorphism seam (see design notes): the
//! registry owns a `HashMap<JobIdentifier, Box<dyn ErasedJobDefinition>>`
//! where each entry closes over its own concrete parameter type `P`. No
//! runtime reflection over payload types happens anywhere else except the
//! single `downcast` used internally to hand a decoded `P` back to its own
//! `execute` closure.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

use serde::de::DeserializeOwned;

use crate::error::{JobFrameworkError, Result};
use crate::jobs::job::{HandlerResult, JobContext, JobIdentifier};

/// Registration record for one job type: name, retry budget, decoder, and
/// handler. Built with [`JobDefinition::new`] or [`JobDefinition::json`]
/// and handed to [`JobRegistry::register`].
pub struct JobDefinition<P, D, E, Fut>
where
    D: Fn(&[u8]) -> std::result::Result<P, serde_json::Error> + Send + Sync + 'static,
    E: Fn(P, JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
    P: Send + 'static,
{
    pub name: JobIdentifier,
    pub max_retry_count: u32,
    pub decode: D,
    pub execute: E,
    _marker: PhantomData<fn() -> (P, Fut)>,
}

impl<P, D, E, Fut> JobDefinition<P, D, E, Fut>
where
    D: Fn(&[u8]) -> std::result::Result<P, serde_json::Error> + Send + Sync + 'static,
    E: Fn(P, JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
    P: Send + 'static,
{
    pub fn new(
        name: impl Into<JobIdentifier>,
        max_retry_count: u32,
        decode: D,
        execute: E,
    ) -> Self {
        Self {
            name: name.into(),
            max_retry_count,
            decode,
            execute,
            _marker: PhantomData,
        }
    }
}

impl<P, E, Fut> JobDefinition<P, fn(&[u8]) -> std::result::Result<P, serde_json::Error>, E, Fut>
where
    P: DeserializeOwned + Send + 'static,
    E: Fn(P, JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    /// Convenience constructor for the common case: parameters are decoded
    /// with `serde_json`.
    pub fn json(name: impl Into<JobIdentifier>, max_retry_count: u32, execute: E) -> Self {
        Self::new(
            name,
            max_retry_count,
            |bytes: &[u8]| serde_json::from_slice(bytes),
            execute,
        )
    }
}

trait ErasedJobDefinition: Send + Sync {
    fn max_retry_count(&self) -> u32;

    /// Decode the raw payload into this definition's concrete parameter
    /// type, erased behind `Any` so the registry stays free of generics.
    /// Kept separate from invocation so callers can decode-and-validate a
    /// job (see [`Invocable::decode_parameters`]) before deciding whether
    /// to run it — e.g. a still-delayed job must be re-enqueued, not
    /// executed, but its parameters must still be proven decodable first.
    fn decode_params(&self, parameters: &[u8]) -> std::result::Result<Box<dyn Any + Send>, serde_json::Error>;

    fn invoke_decoded<'a>(
        &'a self,
        params: Box<dyn Any + Send>,
        ctx: JobContext,
    ) -> Pin<Box<dyn Future<Output = HandlerResult> + Send + 'a>>;
}

struct TypedJobDefinition<P, D, E, Fut>
where
    D: Fn(&[u8]) -> std::result::Result<P, serde_json::Error> + Send + Sync + 'static,
    E: Fn(P, JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
    P: Send + 'static,
{
    max_retry_count: u32,
    decode: D,
    execute: E,
    _marker: PhantomData<fn() -> (P, Fut)>,
}

impl<P, D, E, Fut> ErasedJobDefinition for TypedJobDefinition<P, D, E, Fut>
where
    D: Fn(&[u8]) -> std::result::Result<P, serde_json::Error> + Send + Sync + 'static,
    E: Fn(P, JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
    P: Send + 'static,
{
    fn max_retry_count(&self) -> u32 {
        self.max_retry_count
    }

    fn decode_params(&self, parameters: &[u8]) -> std::result::Result<Box<dyn Any + Send>, serde_json::Error> {
        let params = (self.decode)(parameters)?;
        Ok(Box::new(params))
    }

    fn invoke_decoded<'a>(
        &'a self,
        params: Box<dyn Any + Send>,
        ctx: JobContext,
    ) -> Pin<Box<dyn Future<Output = HandlerResult> + Send + 'a>> {
        Box::pin(async move {
            let params = *params
                .downcast::<P>()
                .expect("decode_params always produces this definition's own parameter type");
            (self.execute)(params, ctx).await
        })
    }
}

/// An invocable job looked up by name, with its parameters still undecoded.
/// Returned by [`JobRegistry::decode`]; call [`Self::decode_parameters`]
/// to decode the payload, then [`DecodedJob::invoke`] to run it.
pub struct Invocable<'a> {
    name: JobIdentifier,
    max_retry_count: u32,
    definition: &'a dyn ErasedJobDefinition,
    parameters: Vec<u8>,
}

impl<'a> Invocable<'a> {
    pub fn name(&self) -> &JobIdentifier {
        &self.name
    }

    pub fn max_retry_count(&self) -> u32 {
        self.max_retry_count
    }

    /// Decode the bound payload into this job's concrete parameter type.
    /// Fails with `DecodeJobFailed` — always terminal, regardless of the
    /// job's retry budget. Separate from invocation so callers can check
    /// decodability before deciding whether a job should actually run
    /// (e.g. a job that is still delayed must not be executed yet, but a
    /// malformed payload must still be caught immediately rather than on
    /// every re-poll).
    pub fn decode_parameters(&self) -> Result<DecodedJob<'a>> {
        self.definition
            .decode_params(&self.parameters)
            .map(|params| DecodedJob {
                definition: self.definition,
                params,
            })
            .map_err(|source| JobFrameworkError::DecodeJobFailed {
                name: self.name.0.clone(),
                source,
            })
    }
}

/// A job whose parameters have already been decoded; ready to run.
pub struct DecodedJob<'a> {
    definition: &'a dyn ErasedJobDefinition,
    params: Box<dyn Any + Send>,
}

impl<'a> DecodedJob<'a> {
    pub async fn invoke(self, ctx: JobContext) -> HandlerResult {
        self.definition.invoke_decoded(self.params, ctx).await
    }
}

/// Maps `JobIdentifier -> JobDefinition`. Populate before `run()`; after
/// that the map is read-many and never mutated, so no locking is needed —
/// callers typically hold the registry behind an `Arc` once built.
#[derive(Default)]
pub struct JobRegistry {
    definitions: HashMap<JobIdentifier, Box<dyn ErasedJobDefinition>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a job definition. Fails with `DuplicateRegistration` if the
    /// name is already present.
    pub fn register<P, D, E, Fut>(&mut self, def: JobDefinition<P, D, E, Fut>) -> Result<()>
    where
        D: Fn(&[u8]) -> std::result::Result<P, serde_json::Error> + Send + Sync + 'static,
        E: Fn(P, JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
        P: Send + 'static,
    {
        if self.definitions.contains_key(&def.name) {
            return Err(JobFrameworkError::DuplicateRegistration(def.name.0));
        }

        let erased = TypedJobDefinition {
            max_retry_count: def.max_retry_count,
            decode: def.decode,
            execute: def.execute,
            _marker: PhantomData,
        };

        self.definitions.insert(def.name.clone(), Box::new(erased));
        Ok(())
    }

    /// Look up `name` in the registry and bind `parameters` for later
    /// decoding. Does not decode eagerly — decode failures surface from
    /// [`Invocable::decode_parameters`] so the caller can still report the
    /// job id they came from.
    pub fn decode<'a>(&'a self, name: &JobIdentifier, parameters: Vec<u8>) -> Result<Invocable<'a>> {
        let definition = self
            .definitions
            .get(name)
            .ok_or_else(|| JobFrameworkError::UnrecognisedJobId(name.0.clone()))?;

        Ok(Invocable {
            name: name.clone(),
            max_retry_count: definition.max_retry_count(),
            definition: definition.as_ref(),
            parameters,
        })
    }

    pub fn contains(&self, name: &JobIdentifier) -> bool {
        self.definitions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    fn ctx() -> JobContext {
        JobContext::new(JobIdentifier::new("test"), 0, CancellationToken::new())
    }

    #[tokio::test]
    async fn register_and_decode_roundtrip() {
        let mut registry = JobRegistry::new();
        registry
            .register(JobDefinition::json(
                "send_email",
                3,
                |_params: serde_json::Value, _ctx: JobContext| async move { Ok(()) },
            ))
            .unwrap();

        let invocable = registry
            .decode(&JobIdentifier::new("send_email"), b"{}".to_vec())
            .unwrap();
        assert_eq!(invocable.max_retry_count(), 3);

        let decoded = invocable.decode_parameters().unwrap();
        assert!(decoded.invoke(ctx()).await.is_ok());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = JobRegistry::new();
        registry
            .register(JobDefinition::json(
                "dup",
                0,
                |_p: serde_json::Value, _ctx: JobContext| async move { Ok(()) },
            ))
            .unwrap();

        let err = registry
            .register(JobDefinition::json(
                "dup",
                0,
                |_p: serde_json::Value, _ctx: JobContext| async move { Ok(()) },
            ))
            .unwrap_err();

        assert!(matches!(err, JobFrameworkError::DuplicateRegistration(name) if name == "dup"));
    }

    #[test]
    fn unrecognised_job_id_is_reported() {
        let registry = JobRegistry::new();
        let err = registry
            .decode(&JobIdentifier::new("missing"), vec![])
            .unwrap_err();
        assert!(matches!(err, JobFrameworkError::UnrecognisedJobId(name) if name == "missing"));
    }

    #[tokio::test]
    async fn decode_failure_surfaces_as_decode_job_failed() {
        let mut registry = JobRegistry::new();
        registry
            .register(JobDefinition::json(
                "typed",
                0,
                |_params: u64, _ctx: JobContext| async move { Ok(()) },
            ))
            .unwrap();

        let invocable = registry
            .decode(&JobIdentifier::new("typed"), b"\"not-a-number\"".to_vec())
            .unwrap();

        let err = invocable.decode_parameters().unwrap_err();
        assert!(matches!(err, JobFrameworkError::DecodeJobFailed { name, .. } if name == "typed"));
    }
}
