//! The property registry, property handles and observers
// (c) 2024 Ross Younger

use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        Arc, Mutex, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use tracing::{debug, trace};

use super::{
    AutoExposureMode, PropertyCategory, PropertyChangeType, PropertyIdentifier, PropertyValue,
    ValueSetType,
    tables::{exposure_lists, seeds},
};
use crate::{
    CameraError,
    camera::Shared,
    config::{ExposurePropertyType, OperationSize},
    exposure::ExposureValue,
    util::lock,
};

type Observer = Arc<dyn Fn(&Property, PropertyChangeType) + Send + Sync>;

#[derive(Debug, Default)]
struct PropertyState {
    current: Option<PropertyValue>,
    pending: Option<PropertyValue>,
    valid: Vec<PropertyValue>,
}

struct PropertyInner {
    identifier: PropertyIdentifier,
    /// How the property is settable whenever it has valid values
    settable_type: ValueSetType,
    state: Mutex<PropertyState>,
    observers: Mutex<Vec<(u64, Observer)>>,
    next_observer: AtomicU64,
    session: Weak<Shared>,
}

/// A camera property.
///
/// This is a cheap handle; clones refer to the same property.
/// A camera hands out exactly one property object per identifier for its whole lifetime,
/// so observers registered on one handle are seen by all of them.
#[derive(Clone)]
pub struct Property {
    inner: Arc<PropertyInner>,
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("Property")
            .field("identifier", &self.inner.identifier)
            .field("current", &state.current)
            .field("pending", &state.pending)
            .field("valid", &state.valid.len())
            .finish_non_exhaustive()
    }
}

/// A registration of an observer on a [`Property`].
///
/// Dropping this token does NOT remove the observer; call [`PropertyObservation::invalidate`]
/// or [`Property::remove_observer`].
#[derive(Debug, Clone)]
pub struct PropertyObservation {
    id: u64,
    property: Weak<PropertyInner>,
}

impl fmt::Debug for PropertyInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyInner")
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

impl PropertyObservation {
    /// Removes the observer.
    /// This is safe to call from inside the observer itself, and more than once.
    pub fn invalidate(&self) {
        if let Some(inner) = self.property.upgrade() {
            lock(&inner.observers).retain(|(id, _)| *id != self.id);
        }
    }
}

impl Property {
    fn new(
        identifier: PropertyIdentifier,
        settable_type: ValueSetType,
        session: Weak<Shared>,
    ) -> Self {
        Self {
            inner: Arc::new(PropertyInner {
                identifier,
                settable_type,
                state: Mutex::new(PropertyState::default()),
                observers: Mutex::new(Vec::new()),
                next_observer: AtomicU64::new(1),
                session,
            }),
        }
    }

    /// Whether two handles refer to the same property object
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// The property's identifier
    #[must_use]
    pub fn identifier(&self) -> PropertyIdentifier {
        self.inner.identifier
    }

    /// The property's category
    #[must_use]
    pub fn category(&self) -> PropertyCategory {
        self.inner.identifier.category()
    }

    /// A human-readable name for the property
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        self.inner.identifier.display_name()
    }

    /// How the property may currently be changed.
    ///
    /// This is empty whenever there are no valid settable values.
    #[must_use]
    pub fn value_set_type(&self) -> ValueSetType {
        if lock(&self.inner.state).valid.is_empty() {
            ValueSetType::empty()
        } else {
            self.inner.settable_type
        }
    }

    /// The current value, if known
    #[must_use]
    pub fn current_value(&self) -> Option<PropertyValue> {
        lock(&self.inner.state).current.clone()
    }

    /// The value being committed, if a change is in progress
    #[must_use]
    pub fn pending_value(&self) -> Option<PropertyValue> {
        lock(&self.inner.state).pending.clone()
    }

    /// The values the property may be set to, in order
    #[must_use]
    pub fn valid_settable_values(&self) -> Vec<PropertyValue> {
        lock(&self.inner.state).valid.clone()
    }

    /// Finds the valid settable value with a given common value
    #[must_use]
    pub fn valid_value_matching_common_value(&self, common_value: i32) -> Option<PropertyValue> {
        self.find_valid(|v| v.common_value() == common_value)
    }

    /// Finds the valid settable value carrying a given exposure value
    #[must_use]
    pub fn valid_value_matching_exposure_value(
        &self,
        exposure: ExposureValue,
    ) -> Option<PropertyValue> {
        self.find_valid(|v| v.exposure_value() == Some(exposure))
    }

    /// The valid settable value at the neutral point of its scale (zero exposure compensation),
    /// if any
    #[must_use]
    pub fn valid_zero_value(&self) -> Option<PropertyValue> {
        self.find_valid(|v| v.exposure_value().is_some_and(|e| e.is_zero()))
    }

    /// The valid settable value meaning "automatic" (e.g. auto ISO), if any
    #[must_use]
    pub fn valid_automatic_value(&self) -> Option<PropertyValue> {
        self.find_valid(|v| v.exposure_value().is_some_and(|e| e.is_automatic()))
    }

    fn find_valid(&self, pred: impl Fn(&PropertyValue) -> bool) -> Option<PropertyValue> {
        lock(&self.inner.state).valid.iter().find(|v| pred(v)).cloned()
    }

    /// Registers an observer, which is called whenever the property changes
    pub fn add_observer<F>(&self, observer: F) -> PropertyObservation
    where
        F: Fn(&Property, PropertyChangeType) + Send + Sync + 'static,
    {
        let id = self.inner.next_observer.fetch_add(1, Ordering::Relaxed);
        lock(&self.inner.observers).push((id, Arc::new(observer)));
        PropertyObservation {
            id,
            property: Arc::downgrade(&self.inner),
        }
    }

    /// Removes an observer. This is safe to call from inside an observer callback.
    pub fn remove_observer(&self, observation: &PropertyObservation) {
        if observation.property.ptr_eq(&Arc::downgrade(&self.inner)) {
            lock(&self.inner.observers).retain(|(id, _)| *id != observation.id);
        }
    }

    /// Calls every observer registered when the notification pass begins.
    fn notify(&self, change: PropertyChangeType) {
        if change.is_empty() {
            return;
        }
        let snapshot: Vec<Observer> = lock(&self.inner.observers)
            .iter()
            .map(|(_, o)| o.clone())
            .collect();
        trace!("{}: notifying {} observer(s) of {change:?}", self.identifier(), snapshot.len());
        for observer in snapshot {
            observer(self, change);
        }
    }

    /// Sets the current value and valid values at once, with a single coalesced notification
    pub(crate) fn apply_internal(&self, current: Option<PropertyValue>, valid: Vec<PropertyValue>) {
        let mut change = PropertyChangeType::empty();
        {
            let mut state = lock(&self.inner.state);
            if state.current != current {
                change |= PropertyChangeType::VALUE;
                state.current = current;
            }
            if state.valid != valid {
                change |= PropertyChangeType::VALID_SETTABLE_VALUES;
                state.valid = valid;
            }
        }
        self.notify(change);
    }

    fn session(&self) -> Result<Arc<Shared>, CameraError> {
        self.inner.session.upgrade().ok_or(CameraError::NotConnected)
    }

    /// Checks the preconditions for changing this property
    fn check_settable(&self, shared: &Shared, needed: ValueSetType) -> Result<(), CameraError> {
        shared.require_connected()?;
        if !shared.current_categories().allows_shooting() {
            return Err(CameraError::IncorrectCommandCategory);
        }
        if !self.value_set_type().contains(needed) {
            return Err(CameraError::NotAvailable);
        }
        Ok(())
    }

    /// Commits a new current value and performs any knock-on effects
    fn commit(&self, shared: &Shared, value: PropertyValue) {
        lock(&self.inner.state).current = Some(value);
        self.notify(PropertyChangeType::VALUE);
        if self.identifier() == PropertyIdentifier::AutoExposureMode {
            shared.properties.apply_auto_exposure_mode();
        }
    }

    /// Sets the property to one of its valid settable values.
    ///
    /// The value is first reported as pending; after the simulated device has accepted it, the
    /// pending value is cleared and the current value updated.
    ///
    /// # Errors
    /// * `NotConnected` if the camera is not connected
    /// * `IncorrectCommandCategory` unless the camera is in a shooting category
    /// * `NotAvailable` if the property cannot be set by enumeration
    /// * `InvalidPropertyValue` if `value` is not one of the valid settable values
    pub async fn set_value(&self, value: PropertyValue) -> Result<(), CameraError> {
        let shared = self.session()?;
        let _guard = shared.transitions.lock().await;
        self.check_settable(&shared, ValueSetType::ENUMERATION)?;

        if !lock(&self.inner.state).valid.contains(&value) {
            debug!("{}: rejecting invalid value {value}", self.identifier());
            shared.latency.wait(OperationSize::Small).await;
            return Err(CameraError::InvalidPropertyValue);
        }

        debug!("{}: setting to {value}", self.identifier());
        lock(&self.inner.state).pending = Some(value.clone());
        self.notify(PropertyChangeType::PENDING_VALUE);

        shared.latency.wait(OperationSize::Small).await;

        lock(&self.inner.state).pending = None;
        self.notify(PropertyChangeType::PENDING_VALUE);
        self.commit(&shared, value);
        Ok(())
    }

    /// Moves the current value one step along the valid settable values, stopping at the end
    pub async fn increment_value(&self) -> Result<(), CameraError> {
        self.step(true).await
    }

    /// Moves the current value one step back along the valid settable values, stopping at the start
    pub async fn decrement_value(&self) -> Result<(), CameraError> {
        self.step(false).await
    }

    async fn step(&self, up: bool) -> Result<(), CameraError> {
        let shared = self.session()?;
        let _guard = shared.transitions.lock().await;
        self.check_settable(&shared, ValueSetType::STEPPING)?;

        let next = {
            let state = lock(&self.inner.state);
            let index = state
                .current
                .as_ref()
                .and_then(|c| state.valid.iter().position(|v| v == c))
                .ok_or(CameraError::NotAvailable)?;
            let stepped = if up {
                (index + 1).min(state.valid.len() - 1)
            } else {
                index.saturating_sub(1)
            };
            if stepped == index {
                return Ok(());
            }
            state.valid[stepped].clone()
        };

        shared.latency.wait(OperationSize::Small).await;
        debug!("{}: stepped to {next}", self.identifier());
        self.commit(&shared, next);
        Ok(())
    }
}

/// Holds one [`Property`] per identifier for the lifetime of a camera
pub(crate) struct PropertyRegistry {
    session: Weak<Shared>,
    exposure_set_type: ValueSetType,
    properties: Mutex<BTreeMap<PropertyIdentifier, Property>>,
}

impl fmt::Debug for PropertyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyRegistry")
            .field("exposure_set_type", &self.exposure_set_type)
            .field("properties", &lock(&self.properties).len())
            .finish_non_exhaustive()
    }
}

impl PropertyRegistry {
    pub(crate) fn new(session: Weak<Shared>, exposure_type: ExposurePropertyType) -> Self {
        let exposure_set_type = match exposure_type {
            ExposurePropertyType::Enumerated => ValueSetType::ENUMERATION,
            ExposurePropertyType::Stepped => ValueSetType::STEPPING,
        };
        Self {
            session,
            exposure_set_type,
            properties: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns the property for an identifier, creating it on first use
    pub(crate) fn property(&self, identifier: PropertyIdentifier) -> Property {
        lock(&self.properties)
            .entry(identifier)
            .or_insert_with(|| {
                let settable_type = if identifier.category() == PropertyCategory::Exposure {
                    self.exposure_set_type
                } else {
                    ValueSetType::ENUMERATION
                };
                Property::new(identifier, settable_type, self.session.clone())
            })
            .clone()
    }

    /// Establishes the values a freshly connected camera reports
    pub(crate) fn seed(&self) {
        for seed in seeds() {
            self.property(seed.id).apply_internal(seed.current, seed.valid);
        }
        self.apply_auto_exposure_mode();
    }

    /// Recomputes the exposure settings controlled by the auto-exposure mode.
    ///
    /// Each affected property keeps its current value if that is still valid, otherwise
    /// it falls back to the mode's default (or to no value, if it is not user-controlled in this
    /// mode).
    pub(crate) fn apply_auto_exposure_mode(&self) {
        let mode = self
            .property(PropertyIdentifier::AutoExposureMode)
            .current_value()
            .and_then(|v| AutoExposureMode::from_common_value(v.common_value()));
        debug!("applying auto-exposure mode {mode:?}");

        for (id, valid, default) in exposure_lists(mode).into_entries() {
            let property = self.property(id);
            let current = match property.current_value() {
                Some(c) if valid.contains(&c) => Some(c),
                _ if valid.is_empty() => None,
                _ => Some(default),
            };
            property.apply_internal(current, valid);
        }
    }

    /// Properties in a category that currently have a value
    pub(crate) fn populated(&self, category: PropertyCategory) -> Vec<Property> {
        let candidates: Vec<Property> = lock(&self.properties)
            .values()
            .filter(|p| p.category() == category)
            .cloned()
            .collect();
        candidates
            .into_iter()
            .filter(|p| p.current_value().is_some())
            .collect()
    }

    /// Clears every value, as when a camera disconnects. Observers stay registered.
    pub(crate) fn reset(&self) {
        let all: Vec<Property> = lock(&self.properties).values().cloned().collect();
        for p in all {
            lock(&p.inner.state).pending = None;
            p.apply_internal(None, Vec::new());
        }
    }
}
