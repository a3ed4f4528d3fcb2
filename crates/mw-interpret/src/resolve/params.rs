use super::*;

impl Evaluator {
    /// Index of `name` in the parameter list matched by the entry at `depth`.
    pub(crate) fn param_index(&self, ctx: &Context, depth: usize, name: &str) -> Option<usize> {
        let entry = ctx.entry(depth)?;
        let def = self.table().try_get(entry.def_id()?)?;
        def.param_list(entry.params?)?.position(name)
    }

    /// Whether the origin's instance binds a parameter called `name`, which
    /// then wins over a child of the same name.
    pub(super) fn shadowed_by_param(&self, ctx: &Context, name: &str, origin: DefId) -> bool {
        self.instance_depth(ctx, origin)
            .and_then(|depth| self.param_index(ctx, depth, name))
            .is_some()
    }

    /// Step 3: a parameter of the origin's instance, the variable of an
    /// enclosing loop in the origin's body, or a parameter of a lexical
    /// container, in that order.
    pub(super) fn parameter(
        &self,
        ctx: &Context,
        name: &str,
        origin: DefId,
    ) -> Option<(Resolved, ParamKind)> {
        let table = self.table();

        let own = self.instance_depth(ctx, origin);
        if let Some(depth) = own {
            if let Some(index) = self.param_index(ctx, depth, name) {
                return Some((Resolved::Parameter { depth, index }, ParamKind::Plain));
            }
        }

        let loop_var = ctx
            .entries()
            .iter()
            .enumerate()
            .rev()
            .take_while(|(depth, _)| own.map(|own| *depth > own).unwrap_or(true))
            .find(|(_, entry)| {
                entry.def.is_node(origin)
                    && entry
                        .loop_frame
                        .as_ref()
                        .map(|frame| frame.var == name)
                        .unwrap_or(false)
            });
        if let Some((depth, _)) = loop_var {
            return Some((Resolved::LoopVariable { depth }, ParamKind::Loop));
        }

        for container in table.owner_chain(origin).into_iter().skip(1) {
            if table.get(container).is_site() {
                break;
            }
            if let Some(depth) = self.instance_depth(ctx, container) {
                if let Some(index) = self.param_index(ctx, depth, name) {
                    return Some((Resolved::Parameter { depth, index }, ParamKind::Container));
                }
            }
        }
        None
    }
}
