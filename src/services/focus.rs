//! Focus coordination across surfaces.
//!
//! A console that keeps focus after the user clicks elsewhere would keep
//! swallowing keystrokes meant for other UI. Consoles therefore register with
//! the coordinator while attached; every pointer-down is reported to it, and
//! each registered surface that was not the target gets its blur callback.
//!
//! Registrations are explicit so their lifetime follows attach/detach.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Identity of an input surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(u64);

thread_local! {
    static NEXT_SURFACE_ID: Cell<u64> = const { Cell::new(1) };
    static GLOBAL: Rc<FocusCoordinator> = Rc::new(FocusCoordinator::new());
}

impl SurfaceId {
    /// Allocate a fresh surface id, unique on this thread.
    pub fn next() -> Self {
        NEXT_SURFACE_ID.with(|n| {
            let id = n.get();
            n.set(id + 1);
            SurfaceId(id)
        })
    }
}

/// Handle returned by [`FocusCoordinator::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FocusRegistration(u64);

struct Registration {
    id: FocusRegistration,
    surface: SurfaceId,
    on_outside_pointer: Rc<dyn Fn()>,
}

#[derive(Default)]
pub struct FocusCoordinator {
    next_id: Cell<u64>,
    registrations: RefCell<Vec<Registration>>,
}

impl std::fmt::Debug for FocusCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FocusCoordinator")
            .field("registrations", &self.len())
            .finish()
    }
}

impl FocusCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide coordinator for the current thread.
    pub fn global() -> Rc<FocusCoordinator> {
        GLOBAL.with(Rc::clone)
    }

    /// Call `on_outside_pointer` whenever a pointer goes down on anything but
    /// `surface`.
    pub fn register(
        &self,
        surface: SurfaceId,
        on_outside_pointer: impl Fn() + 'static,
    ) -> FocusRegistration {
        let id = FocusRegistration(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.registrations.borrow_mut().push(Registration {
            id,
            surface,
            on_outside_pointer: Rc::new(on_outside_pointer),
        });
        tracing::debug!("focus: {:?} registered for {:?}", id, surface);
        id
    }

    pub fn unregister(&self, id: FocusRegistration) -> bool {
        let mut regs = self.registrations.borrow_mut();
        let before = regs.len();
        regs.retain(|r| r.id != id);
        regs.len() != before
    }

    pub fn is_registered(&self, id: FocusRegistration) -> bool {
        self.registrations.borrow().iter().any(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.registrations.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Report a pointer-down. `target` is the surface under the pointer, or
    /// `None` when it landed outside every known surface.
    ///
    /// Returns how many surfaces were blurred.
    pub fn pointer_down(&self, target: Option<SurfaceId>) -> usize {
        let callbacks: Vec<Rc<dyn Fn()>> = self
            .registrations
            .borrow()
            .iter()
            .filter(|r| Some(r.surface) != target)
            .map(|r| r.on_outside_pointer.clone())
            .collect();

        for callback in &callbacks {
            callback();
        }
        callbacks.len()
    }
}
