//! Scene mutation mask.

bitflags::bitflags! {
    /// Categories of scene state mutated since the renderer last looked.
    ///
    /// Every [`Scene`](crate::Scene) mutator sets the bits it affects;
    /// [`Scene::take_dirt`](crate::Scene::take_dirt) hands the mask to the
    /// renderer and clears it.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct SceneDirt: u32 {
        /// Camera transform or projection.
        const CAMERA = 1 << 0;
        /// Light values or light count.
        const LIGHTS = 1 << 1;
        /// Primitive world transforms.
        const XFORMS = 1 << 2;
        /// Texture set or texture contents.
        const TEXTURES = 1 << 3;
        /// Material parameters or texture assignments.
        const MATERIALS = 1 << 4;
        /// Primitives added, removed or reassigned.
        const PRIMITIVES = 1 << 5;
    }
}
