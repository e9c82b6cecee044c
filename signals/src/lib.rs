/*!
Reactive signals for optisync

# Design requirements:
- Writers and readers are different types: a `Mut` owns the value, a `Read` only observes it
- Reading never notifies; only writes do
- A `Read` keeps a reference to the present value, so late subscribers can always look at it
- Closure subscriptions receive a clone of the new value
- Async code can wait for a value to satisfy a predicate

# Nomenclature:
- `listen` - low level, notification only, no payload
- `subscribe` - receives the new value on every change, does not fire for the current value
- `wait_for` - resolves as soon as the predicate matches, immediately if it already does

# Basic usage

```rust
use optisync_signals::*;

let signal = Mut::new(42);
let _guard = signal.read().subscribe(|value: i32| println!("Read value: {}", value));
signal.set(43);
// Read value: 43
assert_eq!(signal.read().get(), 43);
```
*/

pub mod broadcast;
pub mod porcelain;
pub mod signal;
pub mod value;

pub use broadcast::{Broadcast, Listener, ListenerGuard};
pub use porcelain::*;
pub use signal::*;
