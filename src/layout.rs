// 该文件是 Huojia （货架巡检） 项目的一部分。
// src/layout.rs - 货架布局数据模型
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use serde::{Deserialize, Serialize};

/// 推断出的空位哨兵值（实际布局中）
pub const EMPTY_SLOT: &str = "EMPTY";

/// 规划中的空位哨兵值（计划布局与差异记录中）
pub const VACANT: &str = "vacío";

/// 一层货架：从左到右的商品编码序列
pub type ShelfLevel = Vec<String>;

/// 整个货架布局：从下到上的货架层序列，最底层为索引 0
pub type Layout = Vec<ShelfLevel>;

/// 判断一个编码是否表示空位
///
/// 两个哨兵值在所有比较处都视为语义相同的空位标记，
/// 空位判断必须统一走这里，避免散落的字符串比较产生分歧
pub fn is_absent(code: &str) -> bool {
  code == EMPTY_SLOT || code == VACANT
}

/// 从类别标签提取商品编码（第一个连字符之前的部分）
///
/// 没有连字符时返回完整标签；提取结果为空时也回退到完整标签，
/// 保证商品编码永远非空
pub fn extract_product_code(class_label: &str) -> String {
  match class_label.find('-') {
    Some(idx) => {
      let code = class_label[..idx].trim();
      if code.is_empty() {
        class_label.to_string()
      } else {
        code.to_string()
      }
    }
    None => class_label.to_string(),
  }
}

/// 判断计划布局是否疑似“最高层在前”的倒序输入
///
/// 经验规则：最底层的排面数通常不少于最高层，
/// 若第一层比最后一层更长则怀疑是倒序。引擎核心始终假定底层在前，
/// 倒序数据应由调用方先行翻转
pub fn looks_top_first(layout: &Layout) -> bool {
  layout.len() > 1 && layout[0].len() >= layout[layout.len() - 1].len()
}

/// 规整化计划布局：空白单元替换为 EMPTY 哨兵值
pub fn sanitize_layout(layout: &Layout) -> Layout {
  layout
    .iter()
    .map(|shelf| {
      shelf
        .iter()
        .map(|code| {
          if code.trim().is_empty() {
            EMPTY_SLOT.to_string()
          } else {
            code.clone()
          }
        })
        .collect()
    })
    .collect()
}

/// 货架上的一个位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotRef {
  pub shelf_index: usize,
  pub slot_index: usize,
}

impl SlotRef {
  pub fn new(shelf_index: usize, slot_index: usize) -> Self {
    SlotRef {
      shelf_index,
      slot_index,
    }
  }
}

/// 计划布局与实际布局之间的单点差异
///
/// expected/found 缺位时使用 vacío 哨兵值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discrepancy {
  pub shelf_index: usize,
  pub slot_index: usize,
  pub expected: String,
  pub found: String,
}

/// 纠正差异所需的单个动作
///
/// move 需要起点和终点，add 只需要终点，remove 只需要起点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Movement {
  Move {
    product: String,
    origin: SlotRef,
    destination: SlotRef,
  },
  Add {
    product: String,
    destination: SlotRef,
  },
  Remove {
    product: String,
    origin: SlotRef,
  },
}

impl Movement {
  /// 动作涉及的商品编码
  pub fn product(&self) -> &str {
    match self {
      Movement::Move { product, .. } => product,
      Movement::Add { product, .. } => product,
      Movement::Remove { product, .. } => product,
    }
  }
}
