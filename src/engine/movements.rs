// 该文件是 Huojia （货架巡检） 项目的一部分。
// src/engine/movements.rs - 纠正动作合成与冗余消除
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

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::layout::{Discrepancy, Layout, Movement, SlotRef, is_absent};

/// 布局中每个非空位商品出现的位置索引
fn index_positions(layout: &Layout) -> HashMap<&str, Vec<SlotRef>> {
  let mut positions: HashMap<&str, Vec<SlotRef>> = HashMap::new();
  for (shelf_index, shelf) in layout.iter().enumerate() {
    for (slot_index, code) in shelf.iter().enumerate() {
      if !is_absent(code) {
        positions
          .entry(code.as_str())
          .or_default()
          .push(SlotRef::new(shelf_index, slot_index));
      }
    }
  }
  positions
}

/// 在差异列表中寻找 product 应去的目标位置：
/// 某个计划位置正好缺这件商品
fn find_destination(
  discrepancies: &[Discrepancy],
  plan_positions: &[SlotRef],
  product: &str,
  exclude_found_same: bool,
) -> Option<SlotRef> {
  for target in plan_positions {
    let wanted = discrepancies.iter().any(|d| {
      d.shelf_index == target.shelf_index
        && d.slot_index == target.slot_index
        && d.expected == product
        && (!exclude_found_same || d.found != product)
    });
    if wanted {
      return Some(*target);
    }
  }
  None
}

/// 在实际布局中寻找 product 放错位置的一处：
/// 计划在该位置期望的不是这件商品
fn find_misplaced(expected: &Layout, real_positions: &[SlotRef], product: &str) -> Option<SlotRef> {
  real_positions
    .iter()
    .find(|pos| {
      expected
        .get(pos.shelf_index)
        .and_then(|shelf| shelf.get(pos.slot_index))
        .map(|code| code.as_str())
        != Some(product)
    })
    .copied()
}

/// 处理“此处多了 found”一侧：found 在计划中另有归属则移走，否则下架
fn resolve_found_side(
  discrepancy: &Discrepancy,
  discrepancies: &[Discrepancy],
  plan_index: &HashMap<&str, Vec<SlotRef>>,
  exclude_found_same: bool,
  movements: &mut Vec<Movement>,
) {
  let here = SlotRef::new(discrepancy.shelf_index, discrepancy.slot_index);
  let destination = plan_index
    .get(discrepancy.found.as_str())
    .and_then(|positions| {
      find_destination(discrepancies, positions, &discrepancy.found, exclude_found_same)
    });

  match destination {
    Some(target) => movements.push(Movement::Move {
      product: discrepancy.found.clone(),
      origin: here,
      destination: target,
    }),
    None => movements.push(Movement::Remove {
      product: discrepancy.found.clone(),
      origin: here,
    }),
  }
}

/// 处理“此处缺少 expected”一侧：expected 在实际中放错了位置则移来，否则补货
fn resolve_expected_side(
  discrepancy: &Discrepancy,
  expected: &Layout,
  real_index: &HashMap<&str, Vec<SlotRef>>,
  movements: &mut Vec<Movement>,
) {
  let here = SlotRef::new(discrepancy.shelf_index, discrepancy.slot_index);
  let origin = real_index
    .get(discrepancy.expected.as_str())
    .and_then(|positions| find_misplaced(expected, positions, &discrepancy.expected));

  match origin {
    Some(source) => movements.push(Movement::Move {
      product: discrepancy.expected.clone(),
      origin: source,
      destination: here,
    }),
    None => movements.push(Movement::Add {
      product: discrepancy.expected.clone(),
      destination: here,
    }),
  }
}

/// 把差异列表转换为纠正动作序列，并消除冗余动作对
pub fn synthesize_movements(
  discrepancies: &[Discrepancy],
  expected: &Layout,
  realized: &Layout,
) -> Vec<Movement> {
  let plan_index = index_positions(expected);
  let real_index = index_positions(realized);

  let mut movements = Vec::new();

  for discrepancy in discrepancies {
    let found_present = !is_absent(&discrepancy.found);
    let expected_present = !is_absent(&discrepancy.expected);

    if found_present && expected_present {
      // 位置上摆错了商品：两侧各自处理
      resolve_found_side(discrepancy, discrepancies, &plan_index, false, &mut movements);
      resolve_expected_side(discrepancy, expected, &real_index, &mut movements);
    } else if !found_present && expected_present {
      // 缺货
      resolve_expected_side(discrepancy, expected, &real_index, &mut movements);
    } else if found_present && !expected_present {
      // 多货
      resolve_found_side(discrepancy, discrepancies, &plan_index, true, &mut movements);
    }
  }

  let optimized = optimize_movements(movements);
  debug!("动作合成完成: {} 个动作", optimized.len());
  optimized
}

/// 消除冗余动作：
/// 完全相同的动作只保留第一个（换位的两条差异会从两侧各推导出同一个移动）；
/// 移动后又下架 → 直接从移动起点下架；
/// 补货后又移动 → 直接补到移动终点。
/// 线性单趟扫描，用已处理索引集避免重复折叠
fn optimize_movements(movements: Vec<Movement>) -> Vec<Movement> {
  let mut optimized = Vec::new();
  let mut processed: HashSet<usize> = HashSet::new();

  for i in 0..movements.len() {
    if processed.contains(&i) {
      continue;
    }

    let mut collapsed = false;

    for j in (i + 1)..movements.len() {
      if processed.contains(&j) {
        continue;
      }

      if movements[j] == movements[i] {
        debug!("去除重复动作: {} 的同一动作出现两次", movements[i].product());
        processed.insert(j);
        continue;
      }

      match (&movements[i], &movements[j]) {
        (
          Movement::Move {
            product,
            origin,
            destination,
          },
          Movement::Remove {
            product: later_product,
            origin: later_origin,
          },
        ) if product == later_product && destination == later_origin => {
          optimized.push(Movement::Remove {
            product: product.clone(),
            origin: *origin,
          });
          processed.insert(i);
          processed.insert(j);
          collapsed = true;
        }
        (
          Movement::Add {
            product,
            destination,
          },
          Movement::Move {
            product: later_product,
            origin: later_origin,
            destination: later_destination,
          },
        ) if product == later_product && destination == later_origin => {
          optimized.push(Movement::Add {
            product: product.clone(),
            destination: *later_destination,
          });
          processed.insert(i);
          processed.insert(j);
          collapsed = true;
        }
        _ => {}
      }

      if collapsed {
        break;
      }
    }

    if !collapsed {
      optimized.push(movements[i].clone());
      processed.insert(i);
    }
  }

  optimized
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::layout::VACANT;

  fn layout(rows: &[&[&str]]) -> Layout {
    rows
      .iter()
      .map(|row| row.iter().map(|c| c.to_string()).collect())
      .collect()
  }

  fn discrepancy(shelf: usize, slot: usize, expected: &str, found: &str) -> Discrepancy {
    Discrepancy {
      shelf_index: shelf,
      slot_index: slot,
      expected: expected.to_string(),
      found: found.to_string(),
    }
  }

  #[test]
  fn no_discrepancies_no_movements() {
    let l = layout(&[&["A"]]);
    assert!(synthesize_movements(&[], &l, &l).is_empty());
  }

  #[test]
  fn swapped_products_become_two_moves() {
    // 换位差异必须生成两个移动，而不是两对补货/下架
    let expected = layout(&[&["A", "B"]]);
    let realized = layout(&[&["B", "A"]]);
    let discrepancies = vec![
      discrepancy(0, 0, "A", "B"),
      discrepancy(0, 1, "B", "A"),
    ];

    let movements = synthesize_movements(&discrepancies, &expected, &realized);

    assert_eq!(movements.len(), 2);
    assert!(movements.contains(&Movement::Move {
      product: "B".to_string(),
      origin: SlotRef::new(0, 0),
      destination: SlotRef::new(0, 1),
    }));
    assert!(movements.contains(&Movement::Move {
      product: "A".to_string(),
      origin: SlotRef::new(0, 1),
      destination: SlotRef::new(0, 0),
    }));
  }

  #[test]
  fn unknown_extra_product_is_removed() {
    let expected = layout(&[&["A", "EMPTY"]]);
    let realized = layout(&[&["A", "Z"]]);
    let discrepancies = vec![discrepancy(0, 1, VACANT, "Z")];

    let movements = synthesize_movements(&discrepancies, &expected, &realized);

    assert_eq!(
      movements,
      vec![Movement::Remove {
        product: "Z".to_string(),
        origin: SlotRef::new(0, 1),
      }]
    );
  }

  #[test]
  fn missing_product_not_on_shelf_is_added() {
    let expected = layout(&[&["A", "B"]]);
    let realized = layout(&[&["A", "EMPTY"]]);
    let discrepancies = vec![discrepancy(0, 1, "B", VACANT)];

    let movements = synthesize_movements(&discrepancies, &expected, &realized);

    assert_eq!(
      movements,
      vec![Movement::Add {
        product: "B".to_string(),
        destination: SlotRef::new(0, 1),
      }]
    );
  }

  #[test]
  fn misplaced_product_is_moved_not_added() {
    // B 应在 (0,1)，实际却在 (1,0)：应生成移动而非补货
    let expected = layout(&[&["A", "B"], &["C"]]);
    let realized = layout(&[&["A", "EMPTY"], &["B"]]);
    let discrepancies = vec![
      discrepancy(0, 1, "B", VACANT),
      discrepancy(1, 0, "C", "B"),
    ];

    let movements = synthesize_movements(&discrepancies, &expected, &realized);

    assert!(movements.contains(&Movement::Move {
      product: "B".to_string(),
      origin: SlotRef::new(1, 0),
      destination: SlotRef::new(0, 1),
    }));
  }

  #[test]
  fn move_then_remove_collapses_to_remove() {
    let movements = vec![
      Movement::Move {
        product: "A".to_string(),
        origin: SlotRef::new(0, 0),
        destination: SlotRef::new(1, 1),
      },
      Movement::Remove {
        product: "A".to_string(),
        origin: SlotRef::new(1, 1),
      },
    ];

    assert_eq!(
      optimize_movements(movements),
      vec![Movement::Remove {
        product: "A".to_string(),
        origin: SlotRef::new(0, 0),
      }]
    );
  }

  #[test]
  fn add_then_move_collapses_to_add() {
    let movements = vec![
      Movement::Add {
        product: "A".to_string(),
        destination: SlotRef::new(0, 0),
      },
      Movement::Move {
        product: "A".to_string(),
        origin: SlotRef::new(0, 0),
        destination: SlotRef::new(2, 3),
      },
    ];

    assert_eq!(
      optimize_movements(movements),
      vec![Movement::Add {
        product: "A".to_string(),
        destination: SlotRef::new(2, 3),
      }]
    );
  }

  #[test]
  fn duplicate_movements_collapse_to_one() {
    let movement = Movement::Move {
      product: "A".to_string(),
      origin: SlotRef::new(0, 0),
      destination: SlotRef::new(0, 1),
    };
    assert_eq!(
      optimize_movements(vec![movement.clone(), movement.clone()]),
      vec![movement]
    );
  }

  #[test]
  fn unrelated_movements_pass_through() {
    let movements = vec![
      Movement::Add {
        product: "A".to_string(),
        destination: SlotRef::new(0, 0),
      },
      Movement::Remove {
        product: "B".to_string(),
        origin: SlotRef::new(1, 0),
      },
    ];

    assert_eq!(optimize_movements(movements.clone()), movements);
  }
}
