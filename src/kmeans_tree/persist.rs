//! Index persistence.
//!
//! The on-disk layout mirrors the in-memory build order: scalar
//! parameters, the full permutation, then the tree in pre-order. Each node
//! is a fixed scalar blob, a leaf/internal tag, its pivot values and then
//! either its permutation offset (leaf) or its children (internal). All
//! scalars are little-endian. There is no version header; compatibility is
//! structural.
//!
//! Loading requires an index constructed over the same dataset the saved
//! index was built from; only the tree and parameters travel in the
//! stream.

use std::io::{self, Read, Write};

use super::node::{Node, NodeKind};
use super::KMeansTreeIndex;
use crate::error::{IndexError, Result};

const TAG_INTERNAL: u8 = 0;
const TAG_LEAF: u8 = 1;

fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_u64<W: Write>(w: &mut W, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_f32<W: Write>(w: &mut W, v: f32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0_u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut buf = [0_u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_f32<R: Read>(r: &mut R) -> io::Result<f32> {
    let mut buf = [0_u8; 4];
    r.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    let mut buf = [0_u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

impl KMeansTreeIndex {
    /// Serialize the built index to `writer`.
    pub fn save<W: Write>(&self, writer: &mut W) -> Result<()> {
        let root = self.built_root()?;

        write_u32(writer, self.branching as u32)?;
        write_u64(writer, self.max_iter as u64)?;
        write_u64(writer, self.memory_counter as u64)?;
        write_f32(writer, self.cb_index)?;
        for &p in &self.perm {
            write_u32(writer, p)?;
        }
        self.save_tree(writer, root)?;
        Ok(())
    }

    fn save_tree<W: Write>(&self, writer: &mut W, node: &Node) -> Result<()> {
        write_f32(writer, node.radius)?;
        write_f32(writer, node.mean_radius)?;
        write_f32(writer, node.variance)?;
        write_u64(writer, node.size as u64)?;
        write_u32(writer, node.level as u32)?;
        match &node.kind {
            NodeKind::Leaf { offset } => {
                writer.write_all(&[TAG_LEAF])?;
                for &v in &node.pivot {
                    write_f32(writer, v)?;
                }
                write_u64(writer, *offset as u64)?;
            }
            NodeKind::Internal { children } => {
                writer.write_all(&[TAG_INTERNAL])?;
                for &v in &node.pivot {
                    write_f32(writer, v)?;
                }
                for child in children {
                    self.save_tree(writer, child)?;
                }
            }
        }
        Ok(())
    }

    /// Load an index previously written with [`save`](Self::save) into
    /// this (dataset-bearing) index, replacing any existing tree and
    /// parameters.
    pub fn load<R: Read>(&mut self, reader: &mut R) -> Result<()> {
        self.branching = read_u32(reader)? as usize;
        self.max_iter = read_u64(reader)? as usize;
        self.memory_counter = read_u64(reader)? as usize;
        self.cb_index = read_f32(reader)?;

        let n = self.dataset.rows();
        let mut perm = Vec::with_capacity(n);
        for _ in 0..n {
            perm.push(read_u32(reader)?);
        }
        self.perm = perm;

        let root = self.load_tree(reader)?;
        self.root = Some(root);
        Ok(())
    }

    fn load_tree<R: Read>(&self, reader: &mut R) -> Result<Node> {
        let radius = read_f32(reader)?;
        let mean_radius = read_f32(reader)?;
        let variance = read_f32(reader)?;
        let size = read_u64(reader)? as usize;
        let level = read_u32(reader)? as usize;
        let tag = read_u8(reader)?;

        let dim = self.dataset.cols();
        let mut pivot = Vec::with_capacity(dim);
        for _ in 0..dim {
            pivot.push(read_f32(reader)?);
        }

        let kind = match tag {
            TAG_LEAF => {
                let offset = read_u64(reader)? as usize;
                if offset + size > self.dataset.rows() {
                    return Err(IndexError::Io(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "leaf slice {}..{} exceeds dataset size {}",
                            offset,
                            offset + size,
                            self.dataset.rows()
                        ),
                    )));
                }
                NodeKind::Leaf { offset }
            }
            TAG_INTERNAL => {
                let mut children = Vec::with_capacity(self.branching);
                for _ in 0..self.branching {
                    children.push(self.load_tree(reader)?);
                }
                NodeKind::Internal { children }
            }
            other => {
                return Err(IndexError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("invalid node tag {}", other),
                )));
            }
        };

        Ok(Node {
            pivot,
            radius,
            mean_radius,
            variance,
            size,
            level,
            kind,
        })
    }
}
