use std::fmt;

use crate::types::ResolvedType;

const INT_REGISTERS: [Location; 6] = [
    Location::Rdi,
    Location::Rsi,
    Location::Rdx,
    Location::Rcx,
    Location::R8,
    Location::R9,
];

const FLOAT_REGISTERS: [Location; 8] = [
    Location::Xmm0,
    Location::Xmm1,
    Location::Xmm2,
    Location::Xmm3,
    Location::Xmm4,
    Location::Xmm5,
    Location::Xmm6,
    Location::Xmm7,
];

/// Where one argument travels in a call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Location {
    Rdi,
    Rsi,
    Rdx,
    Rcx,
    R8,
    R9,
    Xmm0,
    Xmm1,
    Xmm2,
    Xmm3,
    Xmm4,
    Xmm5,
    Xmm6,
    Xmm7,
    Stack,
}

impl Location {
    pub fn is_int_register(self) -> bool {
        matches!(
            self,
            Location::Rdi
                | Location::Rsi
                | Location::Rdx
                | Location::Rcx
                | Location::R8
                | Location::R9
        )
    }

    pub fn is_float_register(self) -> bool {
        !self.is_int_register() && self != Location::Stack
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Location::Rdi => "rdi",
            Location::Rsi => "rsi",
            Location::Rdx => "rdx",
            Location::Rcx => "rcx",
            Location::R8 => "r8",
            Location::R9 => "r9",
            Location::Xmm0 => "xmm0",
            Location::Xmm1 => "xmm1",
            Location::Xmm2 => "xmm2",
            Location::Xmm3 => "xmm3",
            Location::Xmm4 => "xmm4",
            Location::Xmm5 => "xmm5",
            Location::Xmm6 => "xmm6",
            Location::Xmm7 => "xmm7",
            Location::Stack => "stack",
        })
    }
}

/// Where a function's result comes back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReturnLocation {
    /// The empty tuple; nothing is returned.
    Void,
    /// Int and bool results.
    Rax,
    /// Float results.
    Xmm0,
    /// Aggregates: the caller reserves `size` bytes and passes the address
    /// in `rdi`, consuming the first integer-register slot.
    Memory { size: u32 },
}

/// One argument slot in the order arguments are popped into place at a call
/// site (registers first, then stack arguments in declaration order).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ArgSlot {
    pub location: Location,
    /// Index into the declared argument list.
    pub index: usize,
}

/// The System V AMD64 convention with the aggregate extension: integral
/// scalars ride `rdi..r9`, floats ride `xmm0..xmm7`, everything else (and
/// any overflow) goes to the stack; aggregate returns come back through a
/// caller-provided slot addressed by `rdi`.
#[derive(Clone, Debug, PartialEq)]
pub struct CallingConvention {
    pub args: Vec<ResolvedType>,
    pub ret: ResolvedType,
    pub ret_location: ReturnLocation,
    pub pop_order: Vec<ArgSlot>,
    /// Total bytes of arguments passed on the stack.
    pub stack_argument_size: u32,
}

impl CallingConvention {
    pub fn new(args: &[ResolvedType], ret: &ResolvedType) -> CallingConvention {
        let mut next_int = 0;
        let mut next_float = 0;

        let ret_location = if ret.is_void() {
            ReturnLocation::Void
        } else {
            match ret {
                ResolvedType::Int | ResolvedType::Bool => ReturnLocation::Rax,
                ResolvedType::Float => ReturnLocation::Xmm0,
                ResolvedType::Array(..) | ResolvedType::Tuple(_) => {
                    // rdi carries the return slot address.
                    next_int += 1;
                    ReturnLocation::Memory {
                        size: ret.stack_size(),
                    }
                }
            }
        };

        let mut registers = Vec::new();
        let mut stack = Vec::new();
        let mut stack_argument_size = 0;
        for (index, arg) in args.iter().enumerate() {
            let integral = matches!(arg, ResolvedType::Int | ResolvedType::Bool);
            if integral && next_int < INT_REGISTERS.len() {
                registers.push(ArgSlot {
                    location: INT_REGISTERS[next_int],
                    index,
                });
                next_int += 1;
            } else if *arg == ResolvedType::Float && next_float < FLOAT_REGISTERS.len() {
                registers.push(ArgSlot {
                    location: FLOAT_REGISTERS[next_float],
                    index,
                });
                next_float += 1;
            } else {
                stack.push(ArgSlot {
                    location: Location::Stack,
                    index,
                });
                stack_argument_size += arg.stack_size();
            }
        }

        let mut pop_order = registers;
        pop_order.extend(stack);

        CallingConvention {
            args: args.to_vec(),
            ret: ret.clone(),
            ret_location,
            pop_order,
            stack_argument_size,
        }
    }

    pub fn returns_in_memory(&self) -> bool {
        matches!(self.ret_location, ReturnLocation::Memory { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn locations(cc: &CallingConvention) -> Vec<(Location, usize)> {
        cc.pop_order.iter().map(|s| (s.location, s.index)).collect()
    }

    #[test]
    fn scalars_ride_registers() {
        let cc = CallingConvention::new(
            &[ResolvedType::Int, ResolvedType::Float, ResolvedType::Bool],
            &ResolvedType::Int,
        );
        assert_eq!(
            locations(&cc),
            vec![
                (Location::Rdi, 0),
                (Location::Xmm0, 1),
                (Location::Rsi, 2),
            ]
        );
        assert_eq!(cc.ret_location, ReturnLocation::Rax);
        assert_eq!(cc.stack_argument_size, 0);
    }

    #[test]
    fn seventh_integral_argument_overflows_to_the_stack() {
        let args = vec![ResolvedType::Int; 7];
        let cc = CallingConvention::new(&args, &ResolvedType::Int);
        assert_eq!(cc.pop_order[5].location, Location::R9);
        assert_eq!(cc.pop_order[6].location, Location::Stack);
        assert_eq!(cc.pop_order[6].index, 6);
        assert_eq!(cc.stack_argument_size, 8);
    }

    #[test]
    fn ninth_float_argument_overflows_to_the_stack() {
        let args = vec![ResolvedType::Float; 9];
        let cc = CallingConvention::new(&args, &ResolvedType::Float);
        assert_eq!(cc.pop_order[7].location, Location::Xmm7);
        assert_eq!(cc.pop_order[8].location, Location::Stack);
        assert_eq!(cc.ret_location, ReturnLocation::Xmm0);
    }

    #[test]
    fn aggregates_always_go_to_the_stack() {
        let tuple = ResolvedType::Tuple(vec![ResolvedType::Int, ResolvedType::Int]);
        let cc = CallingConvention::new(
            &[tuple.clone(), ResolvedType::Int],
            &ResolvedType::void(),
        );
        assert_eq!(
            locations(&cc),
            vec![(Location::Rdi, 1), (Location::Stack, 0)]
        );
        assert_eq!(cc.stack_argument_size, 16);
        assert_eq!(cc.ret_location, ReturnLocation::Void);
    }

    #[test]
    fn aggregate_return_consumes_the_first_integer_slot() {
        let array = ResolvedType::Array(Box::new(ResolvedType::Float), 1);
        let cc = CallingConvention::new(&[ResolvedType::Int], &array);
        assert_eq!(cc.ret_location, ReturnLocation::Memory { size: 16 });
        // rdi is taken by the return address, so the int argument shifts.
        assert_eq!(locations(&cc), vec![(Location::Rsi, 0)]);
    }

    #[test]
    fn register_pool_exhaustion_is_per_class() {
        let args = vec![
            ResolvedType::Int,
            ResolvedType::Int,
            ResolvedType::Int,
            ResolvedType::Int,
            ResolvedType::Int,
            ResolvedType::Int,
            ResolvedType::Float,
            ResolvedType::Int,
        ];
        let cc = CallingConvention::new(&args, &ResolvedType::Int);
        // Ints exhaust rdi..r9; the float still rides xmm0; the last int
        // overflows.
        assert_eq!(cc.pop_order[6].location, Location::Xmm0);
        assert_eq!(cc.pop_order[6].index, 6);
        assert_eq!(cc.pop_order[7].location, Location::Stack);
    }
}
