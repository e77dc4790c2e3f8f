/// Declares a struct of metric handles that builds its own [`Registry`](crate::Registry).
///
/// Each field is declared with the kind of metric it holds: `Counter`, `Gauge`, `GaugeF64`,
/// `Meter`, `Timer` or `Histogram`. The field name, lower-cased, becomes the metric name unless
/// an `as "name"` override is given. Histograms use a uniform sample by default and accept a
/// `["kind", "value"]` sample specification, parsed with
/// [`SampleConfig::parse`](crate::SampleConfig::parse).
///
/// The generated `register` function creates every metric and returns the group along with the
/// registry holding them.
///
/// ```
/// use metrics_registry::metric_group;
///
/// metric_group! {
///     pub struct ServerMetrics {
///         pub requests: Counter,
///         pub in_flight: Gauge as "InFlight",
///         pub latency: Timer,
///         pub payload: Histogram ["exp", "1028-0.015"],
///     }
/// }
///
/// let (metrics, registry) = ServerMetrics::register().expect("valid metric group");
/// metrics.requests.inc(1);
/// assert!(registry.get("inflight").is_some());
/// ```
///
/// # Errors
///
/// `register` fails with [`BuildError::DuplicatedName`](crate::BuildError::DuplicatedName) when
/// two fields map to the same name, and with [`BuildError::Sample`](crate::BuildError::Sample)
/// when a histogram sample specification is malformed. No registry is returned in either case.
#[macro_export]
macro_rules! metric_group {
    (
        $(#[$meta:meta])*
        $vis:vis struct $group:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $kind:ident
                    $(as $rename:literal)?
                    $([$sample_kind:literal, $sample_value:literal])?
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $group {
            $(
                $(#[$field_meta])*
                $field_vis $field: ::std::sync::Arc<$crate::$kind>,
            )*
        }

        impl $group {
            /// Creates every metric of the group and the registry holding them.
            pub fn register(
            ) -> ::std::result::Result<(Self, $crate::Registry), $crate::BuildError> {
                let mut builder = $crate::RegistryBuilder::new();
                let group = Self {
                    $(
                        $field: $crate::__metric_group_field!(
                            builder,
                            $kind,
                            $crate::__metric_group_name!($field $(, $rename)?)
                            $(, $sample_kind, $sample_value)?
                        ),
                    )*
                };
                let registry = builder.build()?;
                ::std::result::Result::Ok((group, registry))
            }
        }

        impl $crate::MetricGroup for $group {
            fn build() -> ::std::result::Result<(Self, $crate::Registry), $crate::BuildError> {
                Self::register()
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __metric_group_name {
    ($field:ident) => {
        ::std::stringify!($field)
    };
    ($field:ident, $rename:literal) => {
        $rename
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __metric_group_field {
    ($builder:ident, Counter, $name:expr) => {
        $builder.add_counter($name)
    };
    ($builder:ident, Gauge, $name:expr) => {
        $builder.add_gauge($name)
    };
    ($builder:ident, GaugeF64, $name:expr) => {
        $builder.add_gauge_f64($name)
    };
    ($builder:ident, Meter, $name:expr) => {
        $builder.add_meter($name)
    };
    ($builder:ident, Timer, $name:expr) => {
        $builder.add_timer($name)
    };
    ($builder:ident, Histogram, $name:expr) => {
        $builder.add_histogram($name, $crate::SampleConfig::default())
    };
    ($builder:ident, Histogram, $name:expr, $sample_kind:literal, $sample_value:literal) => {
        match $crate::SampleConfig::parse($sample_kind, $sample_value) {
            ::std::result::Result::Ok(config) => $builder.add_histogram($name, config),
            ::std::result::Result::Err(e) => {
                // The field still needs a handle; `build` reports the error.
                $builder.fail(e.into());
                ::std::sync::Arc::new($crate::Histogram::default())
            }
        }
    };
}
