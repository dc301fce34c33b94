use std::ops::{Deref, DerefMut};

use crate::backend::{AttributeLocation, BindingContext};

use super::ShaderProgram;

/// Scope in which a program's per-instance attributes advance per instance.
///
/// Entering sets the divisor of every attribute declared with `divisor > 0`.
/// Dropping the scope resets them to 0, so the next renderer starts from
/// per-vertex state no matter how the scope was left.
///
/// The scope borrows the context mutably and derefs to it; issue the
/// instanced work through the scope.
pub struct InstanceScope<'a, C: BindingContext + ?Sized> {
    ctx: &'a mut C,
    locations: Vec<AttributeLocation>,
}

impl<'a, C: BindingContext + ?Sized> InstanceScope<'a, C> {
    pub fn enter(ctx: &'a mut C, program: &ShaderProgram) -> Self {
        let mut locations = Vec::new();
        for a in program.attributes() {
            if a.descriptor.divisor > 0 {
                ctx.set_divisor(a.location, a.descriptor.divisor);
                locations.push(a.location);
            }
        }
        Self { ctx, locations }
    }
}

impl<C: BindingContext + ?Sized> Deref for InstanceScope<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.ctx
    }
}

impl<C: BindingContext + ?Sized> DerefMut for InstanceScope<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.ctx
    }
}

impl<C: BindingContext + ?Sized> Drop for InstanceScope<'_, C> {
    fn drop(&mut self) {
        for location in &self.locations {
            self.ctx.set_divisor(*location, 0);
        }
    }
}
