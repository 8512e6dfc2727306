//! Device and platform entity backed by a host-supplied property source.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use pulse_state::{InspectableEvent, Selector, State, StateMachine, Subscriptions};
use pulse_types::{schemas, SelfDescribingJson};
use serde_json::{Map, Number, Value};

/// A device or platform property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PlatformProperty {
    OsType,
    OsVersion,
    DeviceModel,
    DeviceManufacturer,
    Carrier,
    NetworkType,
    NetworkTechnology,
    BatteryLevel,
    BatteryState,
    LowPowerMode,
    AvailableStorage,
    TotalStorage,
    PhysicalMemory,
    AppAvailableMemory,
}

/// Properties read once and never refreshed.
const FIXED: [PlatformProperty; 4] = [
    PlatformProperty::OsType,
    PlatformProperty::OsVersion,
    PlatformProperty::DeviceModel,
    PlatformProperty::DeviceManufacturer,
];

const MOBILE: [PlatformProperty; 7] = [
    PlatformProperty::BatteryLevel,
    PlatformProperty::BatteryState,
    PlatformProperty::LowPowerMode,
    PlatformProperty::AvailableStorage,
    PlatformProperty::TotalStorage,
    PlatformProperty::PhysicalMemory,
    PlatformProperty::AppAvailableMemory,
];

const NETWORK: [PlatformProperty; 3] = [
    PlatformProperty::Carrier,
    PlatformProperty::NetworkType,
    PlatformProperty::NetworkTechnology,
];

impl PlatformProperty {
    /// Key in the platform entity.
    pub fn key(self) -> &'static str {
        match self {
            Self::OsType => "osType",
            Self::OsVersion => "osVersion",
            Self::DeviceModel => "deviceModel",
            Self::DeviceManufacturer => "deviceManufacturer",
            Self::Carrier => "carrier",
            Self::NetworkType => "networkType",
            Self::NetworkTechnology => "networkTechnology",
            Self::BatteryLevel => "batteryLevel",
            Self::BatteryState => "batteryState",
            Self::LowPowerMode => "lowPowerMode",
            Self::AvailableStorage => "availableStorage",
            Self::TotalStorage => "totalStorage",
            Self::PhysicalMemory => "physicalMemory",
            Self::AppAvailableMemory => "appAvailableMemory",
        }
    }

    // Numeric and boolean properties are reported as JSON numbers and
    // booleans; a value that does not parse is dropped.
    fn to_value(self, raw: String) -> Option<Value> {
        match self {
            Self::BatteryLevel
            | Self::AvailableStorage
            | Self::TotalStorage
            | Self::PhysicalMemory
            | Self::AppAvailableMemory => raw
                .trim()
                .parse::<i64>()
                .ok()
                .map(|n| Value::Number(Number::from(n))),
            Self::LowPowerMode => raw.trim().parse::<bool>().ok().map(Value::Bool),
            _ => Some(Value::String(raw)),
        }
    }
}

/// Supplies platform properties on demand. Returns `None` for anything the
/// host cannot determine.
pub trait PropertySource: Send + Sync {
    fn property(&self, property: PlatformProperty) -> Option<String>;
}

/// Refresh windows for the cached property groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshWindows {
    /// Battery, storage and memory.
    pub mobile: Duration,
    /// Carrier and network.
    pub network: Duration,
}

impl Default for RefreshWindows {
    fn default() -> Self {
        Self {
            mobile: Duration::from_secs(1),
            network: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Default)]
struct Group {
    values: BTreeMap<PlatformProperty, Value>,
    fetched_at: Option<Instant>,
}

impl Group {
    fn refresh(
        &mut self,
        source: &dyn PropertySource,
        properties: &[PlatformProperty],
        window: Option<Duration>,
        now: Instant,
    ) {
        let fresh = match (self.fetched_at, window) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(at), Some(window)) => now.duration_since(at) < window,
        };
        if fresh {
            return;
        }
        self.values = properties
            .iter()
            .filter_map(|p| {
                let value = source.property(*p).and_then(|raw| p.to_value(raw))?;
                Some((*p, value))
            })
            .collect();
        self.fetched_at = Some(now);
    }
}

#[derive(Debug, Default)]
struct Cache {
    fixed: Group,
    mobile: Group,
    network: Group,
}

/// Caches platform properties and renders them as an entity.
pub struct PlatformContext {
    source: Arc<dyn PropertySource>,
    windows: RefreshWindows,
    cache: Mutex<Cache>,
}

impl PlatformContext {
    pub fn new(source: Arc<dyn PropertySource>, windows: RefreshWindows) -> Self {
        Self {
            source,
            windows,
            cache: Mutex::new(Cache::default()),
        }
    }

    /// Current properties, refreshing any group whose window has elapsed.
    /// Returns `None` when the source knows nothing.
    pub fn entity(&self) -> Option<SelfDescribingJson> {
        self.entity_at(Instant::now())
    }

    fn entity_at(&self, now: Instant) -> Option<SelfDescribingJson> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let source = self.source.as_ref();
        cache.fixed.refresh(source, &FIXED, None, now);
        cache.mobile.refresh(source, &MOBILE, Some(self.windows.mobile), now);
        cache.network.refresh(source, &NETWORK, Some(self.windows.network), now);

        let data: Map<String, Value> = [&cache.fixed, &cache.mobile, &cache.network]
            .into_iter()
            .flat_map(|g| g.values.iter())
            .map(|(p, v)| (p.key().to_string(), v.clone()))
            .collect();
        if data.is_empty() {
            return None;
        }
        Some(SelfDescribingJson::new(schemas::MOBILE_CONTEXT, data))
    }
}

impl std::fmt::Debug for PlatformContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformContext")
            .field("windows", &self.windows)
            .finish_non_exhaustive()
    }
}

/// Attaches the platform entity to every event.
#[derive(Debug)]
pub struct PlatformContextStateMachine {
    context: PlatformContext,
}

impl PlatformContextStateMachine {
    pub const IDENTIFIER: &'static str = "PlatformContext";

    pub fn new(context: PlatformContext) -> Self {
        Self { context }
    }
}

impl StateMachine for PlatformContextStateMachine {
    fn identifier(&self) -> &str {
        Self::IDENTIFIER
    }

    fn subscriptions(&self) -> Subscriptions {
        Subscriptions {
            entities: Selector::All,
            ..Subscriptions::default()
        }
    }

    fn entities(
        &self,
        _event: &InspectableEvent,
        _state: Option<&dyn State>,
    ) -> Option<Vec<SelfDescribingJson>> {
        self.context.entity().map(|e| vec![e])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Device {
        reads: AtomicUsize,
        battery: Mutex<String>,
        carrier: Mutex<String>,
    }

    impl PropertySource for Device {
        fn property(&self, property: PlatformProperty) -> Option<String> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            match property {
                PlatformProperty::OsType => Some("ios".to_string()),
                PlatformProperty::OsVersion => Some("17.1".to_string()),
                PlatformProperty::BatteryLevel => Some(self.battery.lock().expect("lock").clone()),
                PlatformProperty::LowPowerMode => Some("false".to_string()),
                PlatformProperty::Carrier => Some(self.carrier.lock().expect("lock").clone()),
                _ => None,
            }
        }
    }

    fn device() -> Arc<Device> {
        let device = Device::default();
        *device.battery.lock().expect("lock") = "80".to_string();
        *device.carrier.lock().expect("lock") = "Acme".to_string();
        Arc::new(device)
    }

    #[test]
    fn absent_properties_are_omitted() {
        let context = PlatformContext::new(device(), RefreshWindows::default());
        let entity = context.entity().expect("entity");

        assert_eq!(entity.schema, schemas::MOBILE_CONTEXT);
        assert_eq!(entity.str_field("osType"), Some("ios"));
        assert_eq!(entity.data.get("batteryLevel"), Some(&Value::from(80)));
        assert_eq!(entity.data.get("lowPowerMode"), Some(&Value::Bool(false)));
        assert!(!entity.data.contains_key("deviceModel"));
        assert!(!entity.data.contains_key("networkType"));
    }

    #[test]
    fn unparseable_numbers_are_dropped() {
        let source = device();
        *source.battery.lock().expect("lock") = "unknown".to_string();
        let entity = PlatformContext::new(source, RefreshWindows::default())
            .entity()
            .expect("entity");
        assert!(!entity.data.contains_key("batteryLevel"));
    }

    #[test]
    fn groups_refresh_on_their_own_windows() {
        let source = device();
        let context = PlatformContext::new(
            Arc::clone(&source) as Arc<dyn PropertySource>,
            RefreshWindows {
                mobile: Duration::from_secs(1),
                network: Duration::from_secs(60),
            },
        );
        let start = Instant::now();
        context.entity_at(start);

        *source.battery.lock().expect("lock") = "50".to_string();
        *source.carrier.lock().expect("lock") = "Other".to_string();

        let within = context.entity_at(start + Duration::from_millis(500)).expect("entity");
        assert_eq!(within.data.get("batteryLevel"), Some(&Value::from(80)));

        let later = context.entity_at(start + Duration::from_secs(2)).expect("entity");
        assert_eq!(later.data.get("batteryLevel"), Some(&Value::from(50)));
        assert_eq!(later.str_field("carrier"), Some("Acme"));

        let much_later = context.entity_at(start + Duration::from_secs(61)).expect("entity");
        assert_eq!(much_later.str_field("carrier"), Some("Other"));
    }

    #[test]
    fn fixed_properties_are_read_once() {
        let source = device();
        let context = PlatformContext::new(
            Arc::clone(&source) as Arc<dyn PropertySource>,
            RefreshWindows {
                mobile: Duration::from_secs(3600),
                network: Duration::from_secs(3600),
            },
        );
        let start = Instant::now();
        context.entity_at(start);
        let reads = source.reads.load(Ordering::SeqCst);
        context.entity_at(start + Duration::from_secs(10));
        assert_eq!(source.reads.load(Ordering::SeqCst), reads);
    }

    #[test]
    fn empty_source_yields_no_entity() {
        struct Nothing;
        impl PropertySource for Nothing {
            fn property(&self, _property: PlatformProperty) -> Option<String> {
                None
            }
        }
        let context = PlatformContext::new(Arc::new(Nothing), RefreshWindows::default());
        assert!(context.entity().is_none());
    }
}
