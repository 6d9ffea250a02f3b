//! Arena-backed coverage tree.
//!
//! Nodes are stored in a vector and refer to each other by [`NodeId`]. The
//! parent link is a plain index used for navigation only; ownership flows
//! from the tree to all of its nodes.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Index;

use super::file::{mutation_coverage, summarize, FileData};
use super::metric::Metric;
use super::mutation::Mutation;
use super::node::{name_hash, Node, NodeId, EMPTY_NAME, ROOT_NAME};
use super::value::{Fraction, Value};
use crate::core::{Error, Result};

/// A rooted tree of coverage nodes.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// Creates a tree with the given node as root.
    ///
    /// Children and parent links of the node are discarded.
    pub fn new(mut root: Node) -> Self {
        root.children.clear();
        root.parent = None;
        Self { nodes: vec![root] }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Number of nodes in the tree.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the root has neither children nor values.
    pub fn is_empty(&self) -> bool {
        let root = &self[self.root()];
        root.children.is_empty() && root.values.is_empty()
    }

    /// Adds a child node, failing if the parent already has a child of that name.
    pub fn add_child(&mut self, parent: NodeId, child: Node) -> Result<NodeId> {
        if self.has_child(parent, &child.name) {
            return Err(Error::DuplicateChildName {
                parent: self[parent].to_string(),
                name: child.name,
            });
        }
        Ok(self.push(parent, child))
    }

    /// Adds a deep copy of another tree below the given parent.
    pub fn add_subtree(&mut self, parent: NodeId, subtree: &Tree) -> Result<NodeId> {
        let root = &subtree[subtree.root()];
        if self.has_child(parent, &root.name) {
            return Err(Error::DuplicateChildName {
                parent: self[parent].to_string(),
                name: root.name.clone(),
            });
        }
        Ok(self.graft(parent, subtree, subtree.root()))
    }

    pub(crate) fn push(&mut self, parent: NodeId, mut child: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        child.children.clear();
        child.parent = Some(parent);
        self.nodes.push(child);
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Copies the subtree of `source` starting at `from` below `parent`.
    pub(crate) fn graft(&mut self, parent: NodeId, source: &Tree, from: NodeId) -> NodeId {
        let id = self.push(parent, source[from].copy_node());
        for &child in source.children(from) {
            self.graft(id, source, child);
        }
        id
    }

    pub fn add_value(&mut self, id: NodeId, value: Value) -> Result<()> {
        self.nodes[id.0].add_value(value)
    }

    pub fn replace_value(&mut self, id: NodeId, value: Value) {
        self.nodes[id.0].replace_value(value);
    }

    pub fn file(&self, id: NodeId) -> Option<&FileData> {
        self[id].file()
    }

    pub fn file_mut(&mut self, id: NodeId) -> Option<&mut FileData> {
        self.nodes.get_mut(id.0).and_then(Node::file_mut)
    }

    fn expect_file_mut(&mut self, id: NodeId) -> Result<&mut FileData> {
        let description = self[id].to_string();
        self.file_mut(id)
            .ok_or_else(|| Error::invalid_value(format!("{description} is not a file")))
    }

    /// Sets the counters of a line in a file node.
    pub fn add_counters(&mut self, file: NodeId, line: u32, covered: u32, missed: u32) -> Result<()> {
        self.expect_file_mut(file)?.add_counters(line, covered, missed);
        Ok(())
    }

    /// Adds a mutation to a file node. The mutation value of the file is
    /// updated by the next [`Tree::summarize_file`].
    pub fn add_mutation(&mut self, file: NodeId, mutation: Mutation) -> Result<()> {
        self.expect_file_mut(file)?.add_mutation(mutation);
        Ok(())
    }

    /// Recomputes the line, branch and mutation values of a file from its line data.
    pub fn summarize_file(&mut self, file: NodeId) -> Result<()> {
        let data = self.expect_file_mut(file)?;
        let mut values = summarize(data.counters());
        values.extend(mutation_coverage(data.mutations()).map(Value::Coverage));

        let node = &mut self.nodes[file.0];
        node.values
            .retain(|v| !matches!(v.metric(), Metric::Line | Metric::Branch | Metric::Mutation));
        node.values.extend(values);
        Ok(())
    }

    /// Returns the file node of a path, creating the file and its package if needed.
    ///
    /// The package is named after the directory of the path with `/` replaced
    /// by `.`, or `-` for files without a directory.
    pub fn find_or_create_file(&mut self, path: &str) -> Result<NodeId> {
        let path = path.replace('\\', "/");
        let path = path.trim_start_matches("./");
        let (package, file_name) = match path.rsplit_once('/') {
            Some((directory, name)) => {
                let directory = directory.trim_matches('/');
                if directory.is_empty() {
                    (EMPTY_NAME.to_string(), name)
                } else {
                    (directory.replace('/', "."), name)
                }
            }
            None => (EMPTY_NAME.to_string(), path),
        };

        let root = self.root();
        let package = match self.child_by_name(root, &package) {
            Some(id) => id,
            None => self.add_child(root, Node::package(package))?,
        };
        match self.child_by_name(package, file_name) {
            Some(id) if self[id].is_file() => Ok(id),
            Some(id) => Err(Error::invalid_value(format!(
                "{} is not a file",
                self[id]
            ))),
            None => self.add_child(package, Node::new_file(file_name, path)),
        }
    }

    /// Returns the class node with the given name below a file, creating it if needed.
    pub fn find_or_create_class(&mut self, file: NodeId, name: &str) -> Result<NodeId> {
        match self.find(file, Metric::Class, name) {
            Some(id) => Ok(id),
            None => self.add_child(file, Node::class(name)),
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self[id].children
    }

    pub fn child_by_name(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|&child| self[child].name == name)
    }

    pub fn has_child(&self, id: NodeId, name: &str) -> bool {
        self.child_by_name(id, name).is_some()
    }

    pub fn has_children(&self, id: NodeId) -> bool {
        !self.children(id).is_empty()
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        self[id].parent.is_none()
    }

    pub fn has_parent(&self, id: NodeId) -> bool {
        self[id].parent.is_some()
    }

    /// Returns the parent of a node; the root has none.
    pub fn parent(&self, id: NodeId) -> Result<NodeId> {
        self[id].parent.ok_or_else(|| Error::NoParent {
            node: self[id].to_string(),
        })
    }

    /// Name of the parent, or `^` for the root.
    ///
    /// Consecutive ancestors with the same metric as the parent are joined
    /// with `.`, so nested packages yield their qualified name.
    pub fn parent_name(&self, id: NodeId) -> String {
        let Some(parent) = self[id].parent else {
            return ROOT_NAME.to_string();
        };
        let metric = self[parent].metric();
        let mut names = Vec::new();
        let mut current = Some(parent);
        while let Some(node) = current.filter(|&n| self[n].metric() == metric) {
            names.push(self[node].name.as_str());
            current = self[node].parent;
        }
        names.reverse();
        names.join(".")
    }

    /// All nodes of the subtree in pre-order, starting with the node itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            result.push(node);
            stack.extend(self.children(node).iter().rev());
        }
        result
    }

    /// Depth-first search for a node with the metric and name, self first.
    pub fn find(&self, start: NodeId, metric: Metric, name: &str) -> Option<NodeId> {
        self.descendants(start)
            .into_iter()
            .find(|&id| self[id].matches(metric, name))
    }

    /// Depth-first search by name hash, see [`name_hash`].
    pub fn find_by_hash_code(&self, start: NodeId, metric: Metric, hash: u64) -> Option<NodeId> {
        self.descendants(start)
            .into_iter()
            .find(|&id| self[id].matches_hash(metric, hash))
    }

    /// Same as [`Tree::find_by_hash_code`] with the hash computed from the name.
    pub fn find_by_name_hash(&self, start: NodeId, metric: Metric, name: &str) -> Option<NodeId> {
        self.find_by_hash_code(start, metric, name_hash(name))
    }

    pub fn find_package(&self, name: &str) -> Option<NodeId> {
        self.find(self.root(), Metric::Package, name)
    }

    /// Finds a file by name or relative path.
    pub fn find_file(&self, name: &str) -> Option<NodeId> {
        self.find(self.root(), Metric::File, name)
    }

    pub fn find_class(&self, name: &str) -> Option<NodeId> {
        self.find(self.root(), Metric::Class, name)
    }

    pub fn find_method(&self, name: &str, signature: &str) -> Option<NodeId> {
        self.descendants(self.root()).into_iter().find(|&id| {
            let node = &self[id];
            node.name == name && node.signature() == Some(signature)
        })
    }

    /// All nodes of the metric in the subtree, in pre-order.
    pub fn all(&self, id: NodeId, metric: Metric) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|&node| self[node].metric() == metric)
            .collect()
    }

    pub fn all_files(&self) -> Vec<NodeId> {
        self.all(self.root(), Metric::File)
    }

    pub fn all_classes(&self) -> Vec<NodeId> {
        self.all(self.root(), Metric::Class)
    }

    pub fn all_methods(&self) -> Vec<NodeId> {
        self.all(self.root(), Metric::Method)
    }

    /// Value of the metric for the subtree, see [`Metric::value_for`].
    pub fn value(&self, id: NodeId, metric: Metric) -> Option<Value> {
        metric.value_for(self, id)
    }

    /// Metrics present in the subtree, including derived metrics whose
    /// dependencies are present.
    pub fn metrics(&self, id: NodeId) -> BTreeSet<Metric> {
        let mut metrics = BTreeSet::new();
        for node in self.descendants(id) {
            metrics.insert(self[node].metric());
            metrics.extend(self[node].values.iter().map(Value::metric));
        }
        let has_lines = metrics.contains(&Metric::Line);
        let has_complexity = metrics.contains(&Metric::Complexity);
        if has_lines {
            metrics.insert(Metric::Loc);
        }
        if has_complexity {
            metrics.insert(Metric::ComplexityMaximum);
        }
        if has_lines && has_complexity {
            metrics.insert(Metric::ComplexityDensity);
        }
        metrics
    }

    /// Metrics of the values stored in the subtree.
    pub fn value_metrics(&self, id: NodeId) -> BTreeSet<Metric> {
        self.descendants(id)
            .into_iter()
            .flat_map(|node| self[node].values.iter().map(Value::metric))
            .collect()
    }

    pub fn contains_metric(&self, id: NodeId, metric: Metric) -> bool {
        self.metrics(id).contains(&metric)
    }

    /// Values of all metrics present in the subtree.
    pub fn aggregate_values(&self, id: NodeId) -> Vec<Value> {
        self.metrics_distribution(id).into_values().collect()
    }

    pub fn metrics_distribution(&self, id: NodeId) -> BTreeMap<Metric, Value> {
        self.metrics(id)
            .into_iter()
            .filter_map(|metric| self.value(id, metric).map(|value| (metric, value)))
            .collect()
    }

    /// Deltas of all metrics present in this subtree and the reference subtree.
    pub fn compute_delta(
        &self,
        id: NodeId,
        reference: &Tree,
        reference_id: NodeId,
    ) -> BTreeMap<Metric, Fraction> {
        let baseline = reference.metrics_distribution(reference_id);
        self.metrics_distribution(id)
            .into_iter()
            .filter_map(|(metric, value)| {
                let delta = value.delta(baseline.get(&metric)?)?;
                Some((metric, delta))
            })
            .collect()
    }

    /// Relative paths of all files in the subtree.
    pub fn files(&self, id: NodeId) -> BTreeSet<String> {
        self.all(id, Metric::File)
            .into_iter()
            .filter_map(|file| self.file(file))
            .map(|data| data.relative_path().to_string())
            .collect()
    }

    /// Mutations of all files in the subtree.
    pub fn mutations(&self, id: NodeId) -> Vec<&Mutation> {
        self.all(id, Metric::File)
            .into_iter()
            .filter_map(|file| self.file(file))
            .flat_map(|data| data.mutations())
            .collect()
    }

    pub fn has_modified_lines(&self, id: NodeId) -> bool {
        self.all(id, Metric::File)
            .into_iter()
            .filter_map(|file| self.file(file))
            .any(FileData::has_modified_lines)
    }

    /// Deep copy of the whole tree.
    pub fn copy_tree(&self) -> Tree {
        self.copy_subtree(self.root(), |_| true)
    }

    /// Deep copy of a subtree; children rejected by the predicate are pruned
    /// together with their descendants.
    pub fn copy_subtree(&self, id: NodeId, predicate: impl Fn(&Node) -> bool) -> Tree {
        let mut copy = Tree::new(self[id].copy_node());
        let root = copy.root();
        self.copy_children(&mut copy, root, id, &predicate);
        copy
    }

    fn copy_children(
        &self,
        copy: &mut Tree,
        target: NodeId,
        source: NodeId,
        predicate: &dyn Fn(&Node) -> bool,
    ) {
        for &child in self.children(source) {
            if predicate(&self[child]) {
                let id = copy.push(target, self[child].copy_node());
                self.copy_children(copy, id, child, predicate);
            }
        }
    }

    /// Copy of the tree that keeps only files whose relative path is listed.
    pub fn filter_by_file_names(&self, names: &BTreeSet<String>) -> Tree {
        self.copy_subtree(self.root(), |node| {
            node.file()
                .is_none_or(|data| names.contains(data.relative_path()))
        })
    }

    fn subtree_eq(&self, id: NodeId, other: &Tree, other_id: NodeId) -> bool {
        let (left, right) = (&self[id], &other[other_id]);
        left.same_content(right)
            && left.children.len() == right.children.len()
            && left
                .children
                .iter()
                .zip(&right.children)
                .all(|(&l, &r)| self.subtree_eq(l, other, r))
    }
}

impl Index<NodeId> for Tree {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }
}

impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.subtree_eq(self.root(), other, other.root())
    }
}

impl Eq for Tree {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Coverage, Magnitude, MutationBuilder, MutationStatus};

    fn line(covered: u32, missed: u32) -> Value {
        Value::Coverage(Coverage::new(Metric::Line, covered, missed).unwrap())
    }

    fn sample() -> (Tree, NodeId) {
        let mut tree = Tree::new(Node::module("module"));
        let edu = tree.add_child(tree.root(), Node::package("edu")).unwrap();
        let hm = tree.add_child(edu, Node::package("hm")).unwrap();
        let file = tree
            .add_child(hm, Node::new_file("Main.java", "src/edu/hm/Main.java"))
            .unwrap();
        tree.add_counters(file, 1, 1, 0).unwrap();
        tree.add_counters(file, 2, 0, 1).unwrap();
        tree.add_counters(file, 3, 1, 1).unwrap();
        tree.summarize_file(file).unwrap();
        let class = tree.add_child(file, Node::class("edu.hm.Main")).unwrap();
        tree.add_child(class, Node::method("main", "([Ljava/lang/String;)V"))
            .unwrap();
        (tree, file)
    }

    #[test]
    fn test_add_child_rejects_duplicate_name() {
        let mut tree = Tree::new(Node::module("module"));
        tree.add_child(tree.root(), Node::package("pkg")).unwrap();
        let before = tree.clone();
        let err = tree
            .add_child(tree.root(), Node::package("pkg"))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateChildName { .. }));
        assert_eq!(tree, before);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_parent_links() {
        let (tree, file) = sample();
        let root = tree.root();
        assert!(tree.is_root(root));
        assert!(!tree.has_parent(root));
        assert!(matches!(tree.parent(root), Err(Error::NoParent { .. })));
        assert!(tree.has_parent(file));
        assert_eq!(tree[tree.parent(file).unwrap()].name, "hm");
    }

    #[test]
    fn test_parent_name_joins_packages() {
        let (tree, file) = sample();
        assert_eq!(tree.parent_name(tree.root()), "^");
        assert_eq!(tree.parent_name(file), "edu.hm");
        let package = tree.find_package("edu").unwrap();
        assert_eq!(tree.parent_name(package), "module");
    }

    #[test]
    fn test_find() {
        let (tree, file) = sample();
        assert_eq!(tree.find_file("Main.java"), Some(file));
        assert_eq!(tree.find_file("src/edu/hm/Main.java"), Some(file));
        assert!(tree.find_class("edu.hm.Main").is_some());
        assert!(tree
            .find_method("main", "([Ljava/lang/String;)V")
            .is_some());
        assert!(tree.find_method("main", "()V").is_none());
        assert!(tree.find_package("missing").is_none());
        assert_eq!(
            tree.find_by_name_hash(tree.root(), Metric::File, "Main.java"),
            Some(file)
        );
    }

    #[test]
    fn test_all_in_pre_order() {
        let (tree, _) = sample();
        let packages: Vec<_> = tree
            .all(tree.root(), Metric::Package)
            .into_iter()
            .map(|id| tree[id].name.clone())
            .collect();
        assert_eq!(packages, vec!["edu", "hm"]);
        assert_eq!(tree.all_files().len(), 1);
        assert_eq!(tree.all_methods().len(), 1);
    }

    #[test]
    fn test_metrics() {
        let (mut tree, file) = sample();
        let metrics = tree.metrics(tree.root());
        assert!(metrics.contains(&Metric::Line));
        assert!(metrics.contains(&Metric::Branch));
        assert!(metrics.contains(&Metric::Loc));
        assert!(!metrics.contains(&Metric::ComplexityDensity));

        tree.add_value(
            file,
            Value::Magnitude(Magnitude::new(Metric::Complexity, 4).unwrap()),
        )
        .unwrap();
        assert!(tree.contains_metric(tree.root(), Metric::ComplexityDensity));
        assert_eq!(
            tree.value_metrics(tree.root()),
            BTreeSet::from([Metric::Line, Metric::Branch, Metric::Complexity])
        );
    }

    #[test]
    fn test_summarize_file() {
        let (tree, file) = sample();
        let lines = tree.value(file, Metric::Line).unwrap();
        let lines = lines.as_coverage().unwrap();
        assert_eq!((lines.covered(), lines.missed()), (2, 1));
        let branches = tree.value(tree.root(), Metric::Branch).unwrap();
        assert_eq!(branches.as_coverage().unwrap().total(), 2);
    }

    #[test]
    fn test_compute_delta() {
        let (current, _) = sample();
        let mut baseline = Tree::new(Node::module("module"));
        let file = baseline.find_or_create_file("src/Main.java").unwrap();
        baseline.add_value(file, line(1, 3)).unwrap();

        let delta = current.compute_delta(current.root(), &baseline, baseline.root());
        // 2/3 - 1/4
        assert_eq!(delta.get(&Metric::Line), Some(&Fraction::new(5, 12)));
        assert!(!delta.contains_key(&Metric::Branch));
    }

    #[test]
    fn test_copy_tree_is_equal_but_independent() {
        let (tree, file) = sample();
        let mut copy = tree.copy_tree();
        assert_eq!(copy, tree);

        copy.add_counters(file, 99, 1, 0).unwrap();
        assert_ne!(copy, tree);
        assert!(!tree.file(file).unwrap().has_coverage_for_line(99));
    }

    #[test]
    fn test_equality_ignores_value_order() {
        let mut left = Tree::new(Node::module("m"));
        let mut right = Tree::new(Node::module("m"));
        let complexity = Value::Magnitude(Magnitude::new(Metric::Complexity, 3).unwrap());
        left.add_value(left.root(), line(1, 1)).unwrap();
        left.add_value(left.root(), complexity).unwrap();
        right.add_value(right.root(), complexity).unwrap();
        right.add_value(right.root(), line(1, 1)).unwrap();
        assert_eq!(left, right);
    }

    #[test]
    fn test_filter_by_file_names() {
        let (mut tree, _) = sample();
        let other = tree.find_or_create_file("lib/Util.java").unwrap();
        tree.add_counters(other, 1, 1, 0).unwrap();

        let names = BTreeSet::from(["lib/Util.java".to_string()]);
        let filtered = tree.filter_by_file_names(&names);
        assert_eq!(filtered.files(filtered.root()), names);
        assert!(filtered.find_package("edu").is_some());
    }

    #[test]
    fn test_find_or_create_file() {
        let mut tree = Tree::new(Node::module("-"));
        let first = tree.find_or_create_file("./src/app/main.ts").unwrap();
        let second = tree.find_or_create_file("src/app/main.ts").unwrap();
        assert_eq!(first, second);
        assert_eq!(tree[tree.parent(first).unwrap()].name, "src.app");
        assert_eq!(tree.file(first).unwrap().relative_path(), "src/app/main.ts");

        let top = tree.find_or_create_file("setup.py").unwrap();
        assert_eq!(tree[tree.parent(top).unwrap()].name, "-");
    }

    #[test]
    fn test_add_counters_to_non_file() {
        let mut tree = Tree::new(Node::module("-"));
        let err = tree.add_counters(tree.root(), 1, 1, 0).unwrap_err();
        assert!(matches!(err, Error::InvalidValue(_)));
    }

    #[test]
    fn test_mutations_and_modified_lines() {
        let (mut tree, file) = sample();
        assert!(!tree.has_modified_lines(tree.root()));
        tree.file_mut(file).unwrap().add_modified_lines([2]);
        assert!(tree.has_modified_lines(tree.root()));

        let mutation = MutationBuilder::new()
            .with_line(2)
            .with_status(MutationStatus::Survived)
            .build()
            .unwrap();
        tree.add_mutation(file, mutation).unwrap();
        assert_eq!(tree.mutations(tree.root()).len(), 1);
        assert!(tree[file].stored_value(Metric::Mutation).is_none());
        tree.summarize_file(file).unwrap();
        assert!(tree[file].stored_value(Metric::Mutation).is_some());
    }

    #[test]
    fn test_add_subtree() {
        let (subtree, _) = sample();
        let mut container = Tree::new(Node::container("Container"));
        let root = container.root();
        let id = container.add_subtree(root, &subtree).unwrap();
        assert_eq!(container[id].name, "module");
        assert_eq!(container.len(), subtree.len() + 1);
        assert!(container.add_subtree(root, &subtree).is_err());
    }

    #[test]
    fn test_is_empty() {
        assert!(Tree::new(Node::module("m")).is_empty());
        assert!(!sample().0.is_empty());
    }
}
