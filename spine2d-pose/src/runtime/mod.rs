mod animation;
mod animation_state;
mod attachments;
mod constraints;
mod skeleton;

pub use animation::*;
pub use animation_state::*;
pub use skeleton::*;

#[cfg(test)]
mod animation_tests;


#[cfg(test)]
mod skeleton_tests;


#[cfg(test)]
mod attachments_tests;
